mod row;

pub use row::{KeyTarget, RowCommands, RowDeleteArgs, RowInsertArgs, RowUpdateArgs};
