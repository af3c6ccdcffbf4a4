mod painter;
mod status_view;
mod table;

pub(crate) use self::painter::Painter;
pub(crate) use self::status_view::{DockingReportView, StatusView, WatchLineView};
pub(crate) use self::table::Table;
