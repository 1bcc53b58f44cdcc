//! # aegis-storage
//!
//! 자격증명 저장소 어댑터.
//! 프로필/액세스 토큰은 JSON 파일, 리프레시 토큰은 OS 키링에 보관한다.
//! 데이터 디렉토리를 지정하지 않으면 인메모리 저장소를 사용한다.

pub mod credential_store;

pub use credential_store::{
    KeyringSecretStore, MemoryCredentialStore, MemorySecretStore, PersistentCredentialStore,
    SecretStore,
};
