mod card;
mod teams;

pub use card::build_message;
pub use teams::TeamsNotifier;
