pub mod a001_student;
pub mod a002_call_list;
