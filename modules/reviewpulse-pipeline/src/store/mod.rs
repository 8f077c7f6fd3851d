pub mod postgres;

pub use postgres::PgReviewStore;
