pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{commit_done, file_modified, header, info, phase, success, update_row};
pub use progress::Spinner;
pub use table::{UpdateTable, stats_table};
pub use theme::{Theme, theme};
