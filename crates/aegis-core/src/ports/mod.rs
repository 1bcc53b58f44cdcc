//! Hexagonal Architecture 포트 인터페이스.
//!
//! 어댑터 crate들이 구현하고, 코어 로직은 trait 객체로만 의존한다.

pub mod api_client;
pub mod companion;
pub mod credential_store;
pub mod location;
pub mod reporting;
pub mod transport;
