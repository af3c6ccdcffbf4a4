pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod watch;
pub(crate) mod ui;

pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat};
pub use self::watch::WatchArgs;
