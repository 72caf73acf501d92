mod backup;

pub use self::backup::{BackupEntry, BackupRecord};
pub(crate) use self::backup::{BackupRow, EntryRow, NewBackupRow};
