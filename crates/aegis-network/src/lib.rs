//! # aegis-network
//!
//! 디스패치 백엔드와의 네트워크 어댑터.
//! REST API(reqwest), 영속 듀플렉스 소켓(tokio-tungstenite),
//! JWT 토큰 게이트키퍼, 연결 상태 모니터를 제공한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use aegis_network::auth::TokenGatekeeper;
//! use aegis_network::http_client::HttpApiClient;
//! use aegis_network::session::SocketSession;
//! use aegis_network::ws::WsConnector;
//! ```

pub mod auth;
pub mod connectivity;
pub mod http_client;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod ws;
