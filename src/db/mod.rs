use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>, wal: bool) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let journal_mode = if wal { SqliteJournalMode::Wal } else { SqliteJournalMode::Delete };
    let options = SqliteConnectOptions::new()
        .journal_mode(journal_mode)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path().join("test.db"), true).await.unwrap();

        let a = crud::add_image(&db, "a.png", "key-a", b"hash-a").await.unwrap();
        let b = crud::add_image(&db, "b.png", "key-b", b"hash-b").await.unwrap();
        assert!(b > a);
        assert_eq!(crud::count_images(&db).await.unwrap(), 2);

        let record = crud::get_image(&db, a).await.unwrap().unwrap();
        assert_eq!(record.name, "a.png");
        assert_eq!(record.artifact, "key-a");
        assert_eq!(record.last_score, 0.0);

        let found = crud::find_image_by_hash(&db, b"hash-b").await.unwrap().unwrap();
        assert_eq!(found.id, b);
        assert!(crud::find_image_by_hash(&db, b"nope").await.unwrap().is_none());

        assert!(crud::cache_last_score(&db, a, 0.5).await.unwrap());
        assert_eq!(crud::get_image(&db, a).await.unwrap().unwrap().last_score, 0.5);

        assert!(crud::delete_image(&db, a).await.unwrap());
        assert!(!crud::delete_image(&db, a).await.unwrap());
        assert!(!crud::cache_last_score(&db, a, 0.9).await.unwrap());

        let ids = crud::list_images(&db).await.unwrap().into_iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![b]);
    }

    #[tokio::test]
    async fn test_artifact_unique() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path().join("test.db"), false).await.unwrap();

        crud::add_image(&db, "a.png", "same", b"1").await.unwrap();
        assert!(crud::add_image(&db, "b.png", "same", b"2").await.is_err());
    }

    #[tokio::test]
    async fn test_hash_unique() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path().join("test.db"), false).await.unwrap();

        crud::add_image(&db, "a.png", "key-a", b"hash").await.unwrap();
        let err = crud::add_image(&db, "b.png", "key-b", b"hash").await.unwrap_err();
        assert!(crud::is_unique_violation(&err));
        assert_eq!(crud::count_images(&db).await.unwrap(), 1);
    }
}
