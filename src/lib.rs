pub mod packet;
pub mod transport;
pub mod gateway;

#[cfg(test)]
mod test_util;
