pub mod execute;
pub mod load_balancer;
pub mod tasks;
pub mod workers;
