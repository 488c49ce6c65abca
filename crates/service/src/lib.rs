pub mod service;

pub use service::{
    get_import_result, get_import_session, run_import_task, start_import, ImportSessionSnapshot,
    ImportSessionStatus, TaskArgs,
};
