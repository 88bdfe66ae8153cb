//! Infrastructure layer.
//!
//! ## 構成
//!
//! - `store`: リングバッファと追記専用ログを組み合わせたメッセージストア
//! - `fanout`: 接続ラッパー、ルームツリー、生存確認スイーパー
//! - `users`: ユーザー設定ファイルの読み込み
//! - `export`: 履歴のエクスポート形式

pub mod export;
pub mod fanout;
pub mod store;
pub mod users;
