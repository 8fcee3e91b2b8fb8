pub mod flash;
pub mod ina219;
pub mod max31865;
