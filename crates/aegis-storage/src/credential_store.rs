//! 자격증명 저장소 구현.
//!
//! `CredentialStore` 포트 구현 2종:
//! - [`PersistentCredentialStore`] — 프로필/액세스 토큰은 JSON 파일,
//!   리프레시 토큰은 OS 키링 (보안 저장소)
//! - [`MemoryCredentialStore`] — 인메모리 (데이터 디렉토리 미지정 시 기본)
//!
//! 토큰 쌍 저장은 단일 쓰기 락 안에서 수행된다. 읽기도 같은 락을
//! 거치므로 절반만 쓰인 쌍이 관찰되지 않는다.

use aegis_core::error::CoreError;
use aegis_core::models::auth::TokenPair;
use aegis_core::models::customer::Customer;
use aegis_core::ports::credential_store::CredentialStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 프로필 파일 이름
const PROFILE_FILE_NAME: &str = "profile.json";

/// 키링 서비스/계정 식별자
const KEYRING_SERVICE: &str = "aegis-client";
const KEYRING_USER: &str = "refresh-token";

/// 리프레시 토큰 보안 슬롯.
///
/// 프로덕션은 OS 키링, 테스트는 인메모리 슬롯을 사용한다.
pub trait SecretStore: Send + Sync {
    /// 저장된 비밀 값
    fn get(&self) -> Option<String>;

    /// 비밀 값 저장
    fn set(&self, value: &str) -> Result<(), CoreError>;

    /// 비밀 값 제거
    fn remove(&self) -> Result<(), CoreError>;
}

/// OS 키링 기반 보안 슬롯
pub struct KeyringSecretStore {
    entry: keyring::Entry,
}

impl KeyringSecretStore {
    /// 기본 서비스/계정으로 키링 엔트리 생성
    pub fn new() -> Result<Self, CoreError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| CoreError::CredentialStore(format!("키링 엔트리 생성 실패: {e}")))?;
        Ok(Self { entry })
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self) -> Option<String> {
        match self.entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!("키링 읽기 실패: {e}");
                None
            }
        }
    }

    fn set(&self, value: &str) -> Result<(), CoreError> {
        self.entry
            .set_password(value)
            .map_err(|e| CoreError::CredentialStore(format!("키링 쓰기 실패: {e}")))
    }

    fn remove(&self) -> Result<(), CoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CoreError::CredentialStore(format!("키링 삭제 실패: {e}"))),
        }
    }
}

/// 인메모리 보안 슬롯 (테스트용)
#[derive(Default)]
pub struct MemorySecretStore {
    slot: RwLock<Option<String>>,
}

impl SecretStore for MemorySecretStore {
    fn get(&self) -> Option<String> {
        self.slot.read().clone()
    }

    fn set(&self, value: &str) -> Result<(), CoreError> {
        *self.slot.write() = Some(value.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), CoreError> {
        *self.slot.write() = None;
        Ok(())
    }
}

/// 디스크에 보존되는 프로필 파일 형태
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfileFile {
    access_token: Option<String>,
    customer: Option<Customer>,
}

/// 영속 자격증명 저장소 — JSON 프로필 + 보안 슬롯
pub struct PersistentCredentialStore {
    profile_path: PathBuf,
    profile: RwLock<ProfileFile>,
    secrets: Box<dyn SecretStore>,
}

impl PersistentCredentialStore {
    /// 플랫폼 데이터 디렉토리 + OS 키링으로 생성
    pub fn new() -> Result<Self, CoreError> {
        let dirs = directories::ProjectDirs::from("com", "aegis", "aegis-client").ok_or_else(
            || CoreError::CredentialStore("플랫폼 데이터 디렉토리를 찾을 수 없습니다".to_string()),
        )?;
        Self::with_secret_store(dirs.data_dir(), Box::new(KeyringSecretStore::new()?))
    }

    /// 지정 디렉토리 + 임의 보안 슬롯으로 생성
    pub fn with_secret_store(
        data_dir: &Path,
        secrets: Box<dyn SecretStore>,
    ) -> Result<Self, CoreError> {
        fs::create_dir_all(data_dir).map_err(|e| {
            CoreError::CredentialStore(format!(
                "데이터 디렉토리 생성 실패: {}: {e}",
                data_dir.display()
            ))
        })?;
        let profile_path = data_dir.join(PROFILE_FILE_NAME);
        let profile = Self::load_profile(&profile_path)?;

        Ok(Self {
            profile_path,
            profile: RwLock::new(profile),
            secrets,
        })
    }

    /// 프로필 파일 로드 (없으면 빈 프로필)
    fn load_profile(path: &Path) -> Result<ProfileFile, CoreError> {
        if !path.exists() {
            return Ok(ProfileFile::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::CredentialStore(format!("프로필 읽기 실패: {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CoreError::CredentialStore(format!("프로필 파싱 실패: {}: {e}", path.display()))
        })
    }

    /// 현재 프로필을 디스크에 기록 (호출측이 쓰기 락 보유)
    fn persist(&self, profile: &ProfileFile) -> Result<(), CoreError> {
        let content = serde_json::to_string_pretty(profile)
            .map_err(|e| CoreError::CredentialStore(format!("프로필 직렬화 실패: {e}")))?;
        fs::write(&self.profile_path, content).map_err(|e| {
            CoreError::CredentialStore(format!(
                "프로필 저장 실패: {}: {e}",
                self.profile_path.display()
            ))
        })?;
        debug!("프로필 저장 완료: {}", self.profile_path.display());
        Ok(())
    }
}

impl CredentialStore for PersistentCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.profile.read().access_token.clone()
    }

    fn save_access_token(&self, token: &str) -> Result<(), CoreError> {
        let mut profile = self.profile.write();
        profile.access_token = Some(token.to_string());
        self.persist(&profile)
    }

    fn refresh_token(&self) -> Option<String> {
        // 쌍 저장과 같은 락을 거쳐 절반 쓰인 쌍 관찰을 막는다
        let _guard = self.profile.read();
        self.secrets.get()
    }

    fn save_refresh_token(&self, token: &str) -> Result<(), CoreError> {
        let _guard = self.profile.write();
        self.secrets.set(token)
    }

    fn save_pair(&self, pair: &TokenPair) -> Result<(), CoreError> {
        let mut profile = self.profile.write();
        self.secrets.set(&pair.refresh)?;
        profile.access_token = Some(pair.access.clone());
        self.persist(&profile)
    }

    fn user(&self) -> Option<Customer> {
        self.profile.read().customer.clone()
    }

    fn save_user(&self, customer: &Customer) -> Result<(), CoreError> {
        let mut profile = self.profile.write();
        if let Some(token) = &customer.token {
            profile.access_token = Some(token.clone());
        }
        profile.customer = Some(customer.clone());
        self.persist(&profile)
    }

    fn clear(&self) -> Result<(), CoreError> {
        let mut profile = self.profile.write();
        self.secrets.remove()?;
        *profile = ProfileFile::default();
        self.persist(&profile)
    }
}

/// 인메모리 자격증명 저장소.
///
/// 데이터 디렉토리 미지정 시의 기본값이자 테스트 더블.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    customer: Option<Customer>,
}

impl MemoryCredentialStore {
    /// 빈 저장소 생성
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    fn save_access_token(&self, token: &str) -> Result<(), CoreError> {
        self.state.write().access_token = Some(token.to_string());
        Ok(())
    }

    fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    fn save_refresh_token(&self, token: &str) -> Result<(), CoreError> {
        self.state.write().refresh_token = Some(token.to_string());
        Ok(())
    }

    fn save_pair(&self, pair: &TokenPair) -> Result<(), CoreError> {
        let mut state = self.state.write();
        state.access_token = Some(pair.access.clone());
        state.refresh_token = Some(pair.refresh.clone());
        Ok(())
    }

    fn user(&self) -> Option<Customer> {
        self.state.read().customer.clone()
    }

    fn save_user(&self, customer: &Customer) -> Result<(), CoreError> {
        let mut state = self.state.write();
        if let Some(token) = &customer.token {
            state.access_token = Some(token.clone());
        }
        state.customer = Some(customer.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        *self.state.write() = MemoryState::default();
        Ok(())
    }
}
