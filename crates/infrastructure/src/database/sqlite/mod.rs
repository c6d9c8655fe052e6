pub mod sqlite_lock_repository;
pub mod sqlite_worker_repository;

pub use sqlite_lock_repository::SqliteLockRepository;
pub use sqlite_worker_repository::SqliteWorkerRepository;
