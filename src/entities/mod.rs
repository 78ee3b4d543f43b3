pub mod activity_logs;
pub mod users;

pub mod prelude {
    pub use super::activity_logs::Entity as ActivityLogs;
    pub use super::users::Entity as Users;
}
