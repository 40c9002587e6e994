pub mod backends;
pub mod rules;
pub mod run;
