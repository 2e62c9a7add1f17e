mod extract;
mod health;
mod watches;

pub use extract::AppJson;
pub use health::healthcheck;
pub use watches::{
    EXPECTED_VERSION_HEADER, create_watch, delete_watch, list_watches, not_found, show_watch,
    update_watch,
};
