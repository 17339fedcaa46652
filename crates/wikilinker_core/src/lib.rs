pub mod client;
pub mod config;
pub mod extract;
pub mod format;
pub mod registry;
pub mod resolve;
pub mod site;

#[cfg(test)]
mod test_support;
