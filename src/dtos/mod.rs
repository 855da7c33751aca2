pub mod expedition;
pub mod shipping_slip;
pub mod user;
