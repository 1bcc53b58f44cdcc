//! 위치 제공자 포트.
//!
//! 구현: `aegis-location` crate (고정/리플레이 제공자, 플랫폼 GPS 연동점)

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::location::LocationSample;

/// 플랫폼 위치 제공자.
///
/// 보고 루프가 틱마다 풀 방식으로 현재 좌표를 샘플링한다.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// 현재 좌표 샘플 반환
    async fn current(&self) -> Result<LocationSample, CoreError>;
}
