//! Durable record store.
//!
//! SQLite is the authoritative history; the cache copies of the same records
//! only exist so other processes can read them cheaply. Announce/finalize
//! are both upserts keyed by the raffle id: duplicate deliveries land on the
//! same row, and a finalize never clobbers announce fields.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::Result;
use crate::records::{GuardRecord, RaffleRecord, UserIdentity};

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RaffleRow {
    id: i64,
    room_id: i64,
    gift_name: String,
    gift_type: Option<String>,
    sender_uid: Option<i64>,
    sender_name: String,
    sender_face: String,
    winner_uid: Option<i64>,
    winner_name: Option<String>,
    winner_face: Option<String>,
    prize_gift_name: Option<String>,
    prize_count: Option<i64>,
    created_time: DateTime<Utc>,
    expire_time: DateTime<Utc>,
    result_payload: Option<String>,
}

impl From<RaffleRow> for RaffleRecord {
    fn from(row: RaffleRow) -> Self {
        let winner = row.winner_name.map(|name| UserIdentity {
            uid: row.winner_uid,
            name,
            face: row.winner_face.unwrap_or_default(),
        });
        RaffleRecord {
            raffle_id: row.id,
            room_id: row.room_id as u64,
            gift_name: row.gift_name,
            gift_type: row.gift_type,
            sender: UserIdentity {
                uid: row.sender_uid,
                name: row.sender_name,
                face: row.sender_face,
            },
            created_time: row.created_time,
            expire_time: row.expire_time,
            prize_gift_name: row.prize_gift_name,
            prize_count: row.prize_count,
            winner,
            result_payload: row.result_payload,
        }
    }
}

impl Storage {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Self::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raffles (
                id INTEGER PRIMARY KEY,
                room_id INTEGER NOT NULL,
                gift_name TEXT NOT NULL,
                gift_type TEXT,
                sender_uid INTEGER,
                sender_name TEXT NOT NULL,
                sender_face TEXT NOT NULL DEFAULT '',
                winner_uid INTEGER,
                winner_name TEXT,
                winner_face TEXT,
                prize_gift_name TEXT,
                prize_count INTEGER,
                created_time TEXT NOT NULL,
                expire_time TEXT NOT NULL,
                result_payload TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guards (
                id INTEGER PRIMARY KEY,
                room_id INTEGER NOT NULL,
                gift_name TEXT NOT NULL,
                sender_uid INTEGER,
                sender_name TEXT NOT NULL,
                sender_face TEXT NOT NULL DEFAULT '',
                created_time TEXT NOT NULL,
                expire_time TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_raffles_room ON raffles(room_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_raffles_expire ON raffles(expire_time)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_guards_room ON guards(room_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_guards_expire ON guards(expire_time)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Save an announced raffle. On conflict the announce fields are
    /// refreshed; result fields are untouched.
    pub async fn record_announced(&self, record: &RaffleRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raffles
                (id, room_id, gift_name, gift_type,
                 sender_uid, sender_name, sender_face,
                 created_time, expire_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                room_id = excluded.room_id,
                gift_name = excluded.gift_name,
                gift_type = excluded.gift_type,
                sender_uid = excluded.sender_uid,
                sender_name = excluded.sender_name,
                sender_face = excluded.sender_face,
                created_time = excluded.created_time,
                expire_time = excluded.expire_time
            "#,
        )
        .bind(record.raffle_id)
        .bind(record.room_id as i64)
        .bind(&record.gift_name)
        .bind(&record.gift_type)
        .bind(record.sender.uid)
        .bind(&record.sender.name)
        .bind(&record.sender.face)
        .bind(record.created_time)
        .bind(record.expire_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Save a resolved raffle. When the announced row already exists only
    /// the result fields are merged in, preserving the announcement.
    pub async fn finalize(&self, record: &RaffleRecord) -> Result<()> {
        let winner = record.winner.as_ref();
        sqlx::query(
            r#"
            INSERT INTO raffles
                (id, room_id, gift_name, gift_type,
                 sender_uid, sender_name, sender_face,
                 winner_uid, winner_name, winner_face,
                 prize_gift_name, prize_count,
                 created_time, expire_time, result_payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                room_id = excluded.room_id,
                winner_uid = excluded.winner_uid,
                winner_name = excluded.winner_name,
                winner_face = excluded.winner_face,
                prize_gift_name = excluded.prize_gift_name,
                prize_count = excluded.prize_count,
                result_payload = excluded.result_payload
            "#,
        )
        .bind(record.raffle_id)
        .bind(record.room_id as i64)
        .bind(&record.gift_name)
        .bind(&record.gift_type)
        .bind(record.sender.uid)
        .bind(&record.sender.name)
        .bind(&record.sender.face)
        .bind(winner.and_then(|w| w.uid))
        .bind(winner.map(|w| w.name.as_str()))
        .bind(winner.map(|w| w.face.as_str()))
        .bind(&record.prize_gift_name)
        .bind(record.prize_count)
        .bind(record.created_time)
        .bind(record.expire_time)
        .bind(&record.result_payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Save a guard purchase (single-phase, full upsert).
    pub async fn save_guard(&self, record: &GuardRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guards
                (id, room_id, gift_name,
                 sender_uid, sender_name, sender_face,
                 created_time, expire_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                room_id = excluded.room_id,
                gift_name = excluded.gift_name,
                sender_uid = excluded.sender_uid,
                sender_name = excluded.sender_name,
                sender_face = excluded.sender_face,
                created_time = excluded.created_time,
                expire_time = excluded.expire_time
            "#,
        )
        .bind(record.raffle_id)
        .bind(record.room_id as i64)
        .bind(&record.gift_name)
        .bind(record.sender.uid)
        .bind(&record.sender.name)
        .bind(&record.sender.face)
        .bind(record.created_time)
        .bind(record.expire_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_raffle(&self, raffle_id: i64) -> Result<Option<RaffleRecord>> {
        let row = sqlx::query_as::<_, RaffleRow>("SELECT * FROM raffles WHERE id = ?")
            .bind(raffle_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(RaffleRecord::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RaffleOutcome;
    use chrono::Duration;

    async fn test_storage() -> (Storage, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", file.path().display());
        let storage = Storage::connect(&url).await.unwrap();
        (storage, file)
    }

    fn announced(raffle_id: i64) -> RaffleRecord {
        let created = Utc::now() - Duration::seconds(30);
        RaffleRecord::announced(
            raffle_id,
            42,
            "小电视",
            Some("small_tv".into()),
            UserIdentity::new(None, "sender", "face"),
            created,
            created + Duration::seconds(600),
        )
    }

    #[tokio::test]
    async fn test_announce_then_finalize_merges() {
        let (storage, _file) = test_storage().await;

        let record = announced(77);
        storage.record_announced(&record).await.unwrap();

        let mut finalized = record.clone();
        finalized.merge_result(RaffleOutcome {
            prize_gift_name: "辣条".into(),
            prize_count: 20,
            winner: UserIdentity::new(None, "winner", ""),
            payload: "{\"cmd\":\"RAFFLE_END\"}".into(),
        });
        storage.finalize(&finalized).await.unwrap();

        let stored = storage.get_raffle(77).await.unwrap().unwrap();
        assert_eq!(stored.gift_name, "小电视");
        assert_eq!(stored.sender.name, "sender");
        assert_eq!(stored.prize_gift_name.as_deref(), Some("辣条"));
        assert_eq!(stored.prize_count, Some(20));
        assert_eq!(stored.winner.as_ref().unwrap().name, "winner");
    }

    #[tokio::test]
    async fn test_duplicate_announce_is_idempotent() {
        let (storage, _file) = test_storage().await;

        let record = announced(78);
        storage.record_announced(&record).await.unwrap();
        storage.record_announced(&record).await.unwrap();

        let stored = storage.get_raffle(78).await.unwrap().unwrap();
        assert_eq!(stored.raffle_id, 78);
        assert_eq!(stored.room_id, 42);
    }

    #[tokio::test]
    async fn test_finalize_without_announce_inserts_fallback() {
        let (storage, _file) = test_storage().await;

        let mut record = RaffleRecord::fallback(
            79,
            42,
            "小电视",
            Some("small_tv".into()),
            UserIdentity::new(None, "sender", ""),
            Utc::now(),
        );
        record.merge_result(RaffleOutcome {
            prize_gift_name: "辣条".into(),
            prize_count: 1,
            winner: UserIdentity::new(None, "winner", ""),
            payload: "{}".into(),
        });
        storage.finalize(&record).await.unwrap();

        let stored = storage.get_raffle(79).await.unwrap().unwrap();
        assert_eq!(stored.prize_count, Some(1));
        assert!(stored.expire_time - stored.created_time == Duration::seconds(180));
    }

    #[tokio::test]
    async fn test_guard_upsert() {
        let (storage, _file) = test_storage().await;

        let now = Utc::now();
        let mut record = GuardRecord {
            raffle_id: 55,
            room_id: 42,
            gift_name: "舰长".into(),
            sender: UserIdentity::new(Some(9), "buyer", ""),
            created_time: now,
            expire_time: now + Duration::days(30),
        };
        storage.save_guard(&record).await.unwrap();

        record.gift_name = "提督".into();
        storage.save_guard(&record).await.unwrap();

        let missing = storage.get_raffle(55).await.unwrap();
        assert!(missing.is_none(), "guards do not shadow raffles");
    }
}
