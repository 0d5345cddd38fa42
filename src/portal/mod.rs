//! ポータルスクレイピングモジュール
//!
//! 認証済みブラウザセッションを1つ保持し、レコードページの取得と
//! 画像ダウンロードを行う

mod session;

pub use session::PortalSession;
