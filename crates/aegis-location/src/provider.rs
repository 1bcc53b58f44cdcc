//! 위치 제공자 구현.
//!
//! 플랫폼 GPS 연동은 `LocationProvider` 포트 뒤의 교체 지점이다.
//! 여기서는 개발/테스트용 제공자 2종을 둔다.

use aegis_core::error::CoreError;
use aegis_core::models::location::LocationSample;
use aegis_core::ports::location::LocationProvider;
use async_trait::async_trait;
use parking_lot::Mutex;

/// 고정 좌표 제공자 — 항상 같은 좌표를 반환
#[derive(Debug)]
pub struct FixedLocationProvider {
    sample: LocationSample,
}

impl FixedLocationProvider {
    /// 지정 좌표로 생성
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            sample: LocationSample::new(latitude, longitude),
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current(&self) -> Result<LocationSample, CoreError> {
        Ok(self.sample)
    }
}

/// 경로 리플레이 제공자 — 주어진 좌표열을 순환 재생
pub struct ReplayLocationProvider {
    route: Vec<LocationSample>,
    cursor: Mutex<usize>,
}

impl ReplayLocationProvider {
    /// 좌표열로 생성. 빈 경로는 허용하지 않는다.
    pub fn new(route: Vec<LocationSample>) -> Result<Self, CoreError> {
        if route.is_empty() {
            return Err(CoreError::Validation {
                field: "route".to_string(),
                message: "빈 경로".to_string(),
            });
        }
        Ok(Self {
            route,
            cursor: Mutex::new(0),
        })
    }
}

#[async_trait]
impl LocationProvider for ReplayLocationProvider {
    async fn current(&self) -> Result<LocationSample, CoreError> {
        let mut cursor = self.cursor.lock();
        let sample = self.route[*cursor % self.route.len()];
        *cursor = (*cursor + 1) % self.route.len();
        Ok(sample)
    }
}
