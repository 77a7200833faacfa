//! Entry points of the two front-ends.

mod remote_viewer;
mod virt_viewer;

pub use remote_viewer::{RECENT_MIME_TYPES, cmd_remote_viewer, is_vv_file};
pub use virt_viewer::cmd_virt_viewer;
