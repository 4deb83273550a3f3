pub mod parcel;
pub mod shape;
pub mod submission;
pub mod views;
