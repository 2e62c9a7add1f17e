mod watches;

pub use watches::WatchService;
