pub mod achievements;
pub mod domain;
pub mod ledger;
pub mod ports;

pub use domain::{
    Achievement, AchievementKind, SessionDraft, SessionRecord, StudyProfile, User, UserCredentials,
};
pub use ledger::{record_session, remove_session, LedgerError, LedgerResult};
pub use ports::{DatabaseService, PortError, PortResult};
