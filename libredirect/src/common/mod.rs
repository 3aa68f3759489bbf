pub mod exe_version;
