//! User facing strings, kept verbatim for existing users.

pub const TASK_CREATED: &str = "Task created successfully!";

pub const NO_PENDING_TASKS: &str = "Tidak ada task pending untuk tanggal ini.";
pub const NO_COMPLETED_TASKS: &str = "Tidak ada task completed untuk tanggal ini.";

pub fn confirm_delete_all(iso_date: &str) -> String {
    format!("Hapus semua task untuk {iso_date}?")
}
