use rusqlite::{params, Connection};

use crate::domain::error::AppError;
use crate::domain::settings::AppSettings;
use crate::domain::types::HistoryEntry;

/// SQLiteストレージ（settings + history）
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// 新規接続（ファイルパス指定）
    pub fn open(path: &str) -> Result<Self, AppError> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::storage(format!("DB接続に失敗: {e}")))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// in-memory DB（テスト用）
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::storage(format!("in-memory DB作成に失敗: {e}")))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// スキーママイグレーション
    fn migrate(&self) -> Result<(), AppError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS settings (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS history (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    original    TEXT NOT NULL,
                    suggestions TEXT NOT NULL DEFAULT '[]',
                    created_at  TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_history_original
                    ON history(original);
                ",
            )
            .map_err(|e| AppError::storage(format!("マイグレーション失敗: {e}")))?;
        Ok(())
    }

    // --- History ---

    /// プレースホルダ書き込み: 空サジェストのエントリを追加し、上限を超えた分を
    /// 古い順に追い出す
    pub fn append_placeholder(
        &self,
        original: &str,
        now: &str,
        cap: u32,
    ) -> Result<(), AppError> {
        self.conn
            .execute(
                "INSERT INTO history (original, suggestions, created_at) VALUES (?1, '[]', ?2)",
                params![original, now],
            )
            .map_err(|e| AppError::storage(format!("履歴挿入失敗: {e}")))?;
        self.enforce_cap(cap)
    }

    /// 結果到着後の書き込み: originalが完全一致する最後のエントリへサジェストを
    /// 反映する。対応するエントリが無ければ false（エラーにはしない）
    pub fn attach_suggestions(
        &self,
        original: &str,
        suggestions: &[String],
    ) -> Result<bool, AppError> {
        let json = serde_json::to_string(suggestions)
            .map_err(|e| AppError::internal(format!("suggestions serialize: {e}")))?;
        let affected = self
            .conn
            .execute(
                "UPDATE history SET suggestions = ?1
                 WHERE id = (SELECT id FROM history WHERE original = ?2
                             ORDER BY id DESC LIMIT 1)",
                params![json, original],
            )
            .map_err(|e| AppError::storage(format!("履歴更新失敗: {e}")))?;
        Ok(affected > 0)
    }

    /// 重複排除書き込み: 同一original（大文字小文字無視）の既存エントリを
    /// 削除してから追加する
    pub fn append_deduped(&self, entry: &HistoryEntry, cap: u32) -> Result<(), AppError> {
        let json = serde_json::to_string(&entry.suggestions)
            .map_err(|e| AppError::internal(format!("suggestions serialize: {e}")))?;
        self.conn
            .execute(
                "DELETE FROM history WHERE lower(original) = lower(?1)",
                params![entry.original],
            )
            .map_err(|e| AppError::storage(format!("履歴重複削除失敗: {e}")))?;
        self.conn
            .execute(
                "INSERT INTO history (original, suggestions, created_at) VALUES (?1, ?2, ?3)",
                params![entry.original, json, entry.date],
            )
            .map_err(|e| AppError::storage(format!("履歴挿入失敗: {e}")))?;
        self.enforce_cap(cap)
    }

    /// 上限超過分を古い順（FIFO）に削除する
    fn enforce_cap(&self, cap: u32) -> Result<(), AppError> {
        self.conn
            .execute(
                "DELETE FROM history WHERE id NOT IN
                 (SELECT id FROM history ORDER BY id DESC LIMIT ?1)",
                params![cap as i64],
            )
            .map_err(|e| AppError::storage(format!("履歴上限適用失敗: {e}")))?;
        Ok(())
    }

    /// オフラインフォールバック検索: queryを部分文字列として含むoriginalのうち
    /// 最新のエントリを返す。サジェスト未反映のプレースホルダは対象外
    pub fn find_cached(&self, query: &str) -> Result<Option<HistoryEntry>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT original, suggestions, created_at FROM history
                 WHERE instr(lower(original), lower(?1)) > 0
                   AND suggestions != '[]'
                 ORDER BY id DESC LIMIT 1",
            )
            .map_err(|e| AppError::storage(format!("クエリ準備失敗: {e}")))?;

        let entry = stmt
            .query_row(params![query], Self::map_history_row)
            .ok();
        Ok(entry)
    }

    /// 部分一致検索（挿入順）。オートコンプリート用
    pub fn search_history(&self, query: &str) -> Result<Vec<HistoryEntry>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT original, suggestions, created_at FROM history
                 WHERE instr(lower(original), lower(?1)) > 0
                 ORDER BY id",
            )
            .map_err(|e| AppError::storage(format!("クエリ準備失敗: {e}")))?;

        let entries = stmt
            .query_map(params![query], Self::map_history_row)
            .map_err(|e| AppError::storage(format!("クエリ実行失敗: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::storage(format!("行読み取り失敗: {e}")))?;

        Ok(entries)
    }

    /// 全履歴（挿入順）
    pub fn list_history(&self) -> Result<Vec<HistoryEntry>, AppError> {
        let mut stmt = self
            .conn
            .prepare("SELECT original, suggestions, created_at FROM history ORDER BY id")
            .map_err(|e| AppError::storage(format!("クエリ準備失敗: {e}")))?;

        let entries = stmt
            .query_map([], Self::map_history_row)
            .map_err(|e| AppError::storage(format!("クエリ実行失敗: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::storage(format!("行読み取り失敗: {e}")))?;

        Ok(entries)
    }

    pub fn clear_history(&self) -> Result<(), AppError> {
        self.conn
            .execute("DELETE FROM history", [])
            .map_err(|e| AppError::storage(format!("履歴削除失敗: {e}")))?;
        Ok(())
    }

    pub fn history_len(&self) -> Result<u32, AppError> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .map_err(|e| AppError::storage(format!("クエリ実行失敗: {e}")))?;
        Ok(count)
    }

    fn map_history_row(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let suggestions_json: String = row.get(1)?;
        Ok(HistoryEntry {
            original: row.get(0)?,
            suggestions: serde_json::from_str(&suggestions_json).unwrap_or_default(),
            date: row.get(2)?,
        })
    }

    // --- Settings ---

    pub fn get_settings(&self) -> Result<AppSettings, AppError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM settings")
            .map_err(|e| AppError::storage(format!("クエリ準備失敗: {e}")))?;

        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| AppError::storage(format!("クエリ実行失敗: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::storage(format!("行読み取り失敗: {e}")))?;

        if rows.is_empty() {
            return Ok(AppSettings::default());
        }

        // key-value をJSONに組み立ててデシリアライズ
        let mut map = serde_json::Map::new();
        for (key, value) in &rows {
            // JSONとして解析可能ならそのまま、そうでなければ文字列として
            if let Ok(v) = serde_json::from_str(value) {
                map.insert(key.clone(), v);
            } else {
                map.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
        }

        let json = serde_json::Value::Object(map);
        let mut settings = AppSettings::default();

        // 各フィールドを上書き（存在するキーだけ）
        if let Ok(merged) = serde_json::from_value::<AppSettings>(json) {
            settings = merged;
        }

        Ok(settings)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<(), AppError> {
        let json = serde_json::to_value(settings)
            .map_err(|e| AppError::internal(format!("settings serialize: {e}")))?;

        if let Some(obj) = json.as_object() {
            for (key, value) in obj {
                let value_str = value.to_string();
                self.conn
                    .execute(
                        "INSERT INTO settings (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value_str],
                    )
                    .map_err(|e| AppError::storage(format!("設定保存失敗: {e}")))?;
            }
        }

        Ok(())
    }
}
