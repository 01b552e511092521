pub mod clock;
pub mod code;
pub mod elapsed;
pub mod error;
pub mod friends;
pub mod sessions;
pub mod users;

mod convert;

use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use elapsed::ElapsedPolicy;
pub use error::{ServiceError, ServiceResult};
pub use friends::FriendService;
pub use sessions::SessionService;
pub use users::UserService;

/// The authenticated user a service call acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
}

impl Caller {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }

    pub(crate) fn id(&self) -> String {
        self.user_id.to_string()
    }
}
