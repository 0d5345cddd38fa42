//! 資材データ抽出ライブラリ
//!
//! - Quickbaseレコード照会 + 認証済みポータルスクレイピングで資材情報を収集
//! - 資材ごとにスナップショットJSONと画像を永続化
//! - バッチごとのExcelサマリーを生成してZIPにパッケージ
//!
//! # サービス使用例
//!
//! ```rust,ignore
//! use material_extractor::{ExtractionRequest, ExtractionService, ExtractorConfig};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ExtractorConfig::from_env().unwrap();
//!     let mut service = ExtractionService::new(&config);
//!
//!     let request = ExtractionRequest::new(["./ES.C95914.xlsx"]).with_headless(true);
//!     let result = service.call(request).await.unwrap();
//!     println!("Reports zip: {:?}", result.zip_path);
//! }
//! ```
//!
//! # パイプラインを個別に使う例
//!
//! ```rust,ignore
//! use material_extractor::{ExtractorConfig, Orchestrator, PortalSession, RecordClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ExtractorConfig::from_env().unwrap();
//!     let session = PortalSession::new(&config);
//!     let lookup = RecordClient::new(&config).unwrap();
//!
//!     let mut orchestrator = Orchestrator::new(&config, session, lookup);
//!     let summary = orchestrator
//!         .run(&["./materials.xlsx".into()], "./downloads/run".as_ref())
//!         .await
//!         .unwrap();
//!     println!("Processed: {}", summary.processed.len());
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod input;
pub mod lookup;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod portal;
pub mod report;
pub mod service;
pub mod traits;

// 主要な型をリエクスポート
pub use config::{BackoffPolicy, ExtractorConfig, FieldNames};
pub use error::ExtractorError;
pub use lookup::RecordClient;
pub use model::{MaterialRecord, QaRequirements, QaValue};
pub use orchestrator::{ExtractionSummary, Orchestrator};
pub use parser::parse_qa_requirements;
pub use portal::PortalSession;
pub use service::{ExtractionRequest, ExtractionResult, ExtractionService};
pub use traits::{MaterialLookup, Session};
