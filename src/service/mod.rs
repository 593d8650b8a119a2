pub mod attendance;
pub mod corrections;

#[cfg(test)]
pub(crate) mod test_support;
