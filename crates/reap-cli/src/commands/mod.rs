pub mod folders;
pub mod maintenance;
pub mod serve;
