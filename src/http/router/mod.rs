pub mod hashing;
pub mod pages;
pub mod reviews;
pub mod router;
