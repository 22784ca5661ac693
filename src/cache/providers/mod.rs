mod moka;
mod noop;

pub use self::moka::MokaCacheService;
pub use self::noop::NoOpCacheService;
