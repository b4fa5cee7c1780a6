pub mod announcements;
pub mod assessments;
pub mod classes;
pub mod core;
pub mod reports;
pub mod results;
pub mod setup;
pub mod students;
