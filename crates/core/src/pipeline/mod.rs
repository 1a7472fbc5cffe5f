pub mod enroll_class_use_case;
pub mod export_unrecognized_use_case;
pub mod take_attendance_use_case;
