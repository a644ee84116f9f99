//! Sea-orm entities backing the sales pipeline tables.

pub mod contact;
pub mod deal;
pub mod deal_stage_history;
pub mod funnel;
pub mod stage;

pub mod prelude {
    pub use super::contact::Entity as Contact;
    pub use super::deal::Entity as Deal;
    pub use super::deal_stage_history::Entity as DealStageHistory;
    pub use super::funnel::Entity as Funnel;
    pub use super::stage::Entity as Stage;
}
