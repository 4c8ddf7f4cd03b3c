//! Chromeネイティブメッセージングのフレーミング。
//! 各メッセージは 4バイトLE長プレフィックス + UTF-8 JSON ドキュメント

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chrome側が受け付けるインバウンド上限（1MiB）
const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("message too large: {0} bytes")]
    TooLarge(u32),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// 長さプレフィックス付きメッセージを1件読む。チャネルが閉じられたら None
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<serde_json::Value>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

/// メッセージを1件書き込む
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    value: &serde_json::Value,
) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(value)?;
    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
