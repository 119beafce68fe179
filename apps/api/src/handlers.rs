pub mod audit_logs;
pub mod downloads;
pub mod exports;
pub mod health;

#[cfg(test)]
mod tests;
