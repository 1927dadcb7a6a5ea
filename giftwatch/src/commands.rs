//! The long-running subcommands.

use tracing::info;

use live_api::LiveApi;
use raffle_core::{
    BroadcastSink, Cache, Config, HandlerContext, InLotteryRooms, MonitorFleet, Notifier,
    QueueConsumer, QueueProducer, RaffleProcessor, Storage,
};

pub async fn monitor(config: Config) -> anyhow::Result<()> {
    let api = LiveApi::new();
    let producer = QueueProducer::connect(&config.queue_addr).await?;

    info!(
        slots = config.monitor_slots,
        categories = config.categories,
        queue = %config.queue_addr,
        "monitor fleet starting"
    );
    MonitorFleet::new(config, api, producer).run().await?;
    Ok(())
}

pub async fn process(config: Config) -> anyhow::Result<()> {
    let cache = Cache::connect(&config.redis_url).await?;
    let storage = Storage::connect(&config.database_url).await?;
    let queue = QueueConsumer::bind(&config.queue_addr).await?;

    let ctx = HandlerContext {
        cache: cache.clone(),
        storage,
        sink: BroadcastSink::new(cache.clone()),
        api: LiveApi::new(),
        notifier: Notifier::new(config.notify_webhook_url.clone()),
        in_lottery: InLotteryRooms::new(cache),
        ignored_danmaku: config.ignored_danmaku.clone(),
    };

    info!(
        workers = config.workers,
        queue = %queue.local_addr(),
        "raffle processor starting"
    );
    RaffleProcessor::new(ctx, config.workers).run(queue).await?;
    Ok(())
}

pub async fn feed(config: Config, since_secs: i64, rooms: bool) -> anyhow::Result<()> {
    let cache = Cache::connect(&config.redis_url).await?;
    let sink = BroadcastSink::new(cache.clone());

    let since = chrono::Utc::now().timestamp() - since_secs;
    for message in sink.recent(since).await? {
        println!("{}", serde_json::to_string(&message)?);
    }

    if rooms {
        let mut active: Vec<u64> = InLotteryRooms::new(cache).all().await?.into_iter().collect();
        active.sort_unstable();
        println!("{}", serde_json::to_string(&active)?);
    }
    Ok(())
}
