//! 子进程执行：逐行读取标准输出，完整收集标准错误

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::{AppError, Result};

/// stderr 写入错误信息时保留的最大长度
const MAX_ERROR_LEN: usize = 2000;

/// 运行外部程序，每读到一行 stdout 就回调一次（`\r` 刷新的进度条也按行拆分）。
///
/// 只有子进程退出后才返回；非零退出码时以 stderr 内容作为错误信息。
pub async fn run_streaming<F>(program: &str, args: &[String], cwd: Option<&Path>, mut on_line: F) -> Result<()>
where
    F: FnMut(&str),
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    tracing::info!("Executing command: {} {}", program, args.join(" "));
    let mut child = command
        .spawn()
        .map_err(|e| AppError::ExternalTool(format!("Failed to start {}: {}", program, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Internal(format!("{}: stdout not captured", program)))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Internal(format!("{}: stderr not captured", program)))?;

    // stderr 单独读取，避免管道写满阻塞子进程
    let stderr_reader = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });

    // 读取结束（含读错误）时 stdout 随之关闭，子进程不会卡在写满的管道上
    forward_lines(program, BufReader::new(stdout), &mut on_line).await;

    let status = child
        .wait()
        .await
        .map_err(|e| AppError::ExternalTool(format!("{} process failed: {}", program, e)))?;
    let stderr_text = stderr_reader.await.unwrap_or_default();

    if !status.success() {
        let detail = stderr_text.trim();
        let detail = if detail.is_empty() {
            status.to_string()
        } else {
            truncate(detail, MAX_ERROR_LEN)
        };
        return Err(AppError::ExternalTool(format!("{} failed: {}", program, detail)));
    }

    if !stderr_text.trim().is_empty() {
        tracing::debug!("{} stderr: {}", program, stderr_text.trim());
    }
    Ok(())
}

/// 逐行回调直到 EOF 或读错误，读取端在返回时释放
async fn forward_lines<R, F>(program: &str, mut reader: R, on_line: &mut F)
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str),
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                for line in text.split(['\r', '\n']).map(str::trim).filter(|l| !l.is_empty()) {
                    tracing::debug!("{} output: {}", program, line);
                    on_line(line);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read {} output: {}", program, e);
                break;
            }
        }
    }
}

/// 保留末尾部分（错误原因通常在最后）
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order() {
        let mut lines = Vec::new();
        run_streaming("sh", &sh("echo one; printf 'two\\rthree\\n'; echo; echo four"), None, |l| {
            lines.push(l.to_string())
        })
        .await
        .unwrap();
        assert_eq!(lines, vec!["one", "two", "three", "four"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_surfaces_stderr() {
        let err = run_streaming("sh", &sh("echo partial; echo 'boom happened' >&2; exit 3"), None, |_| {})
            .await
            .unwrap_err();
        match err {
            AppError::ExternalTool(msg) => assert!(msg.contains("boom happened"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        let err = run_streaming("sh", &sh("exit 2"), None, |_| {}).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalTool(_)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_streaming("definitely-not-a-real-binary-xyz", &[], None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalTool(msg) if msg.contains("Failed to start")));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        run_streaming("sh", &sh("touch made-here"), Some(dir.path()), |_| {})
            .await
            .unwrap();
        assert!(dir.path().join("made-here").exists());
    }

    /// 先给出一行，之后每次读取都失败
    struct BrokenPipe {
        sent: bool,
    }

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke")));
            }
            self.sent = true;
            buf.put_slice(b"[download]  10.0%\n");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_error_stops_forwarding() {
        let mut lines = Vec::new();
        let reader = BufReader::new(BrokenPipe { sent: false });
        forward_lines("tool", reader, &mut |l: &str| lines.push(l.to_string())).await;
        assert_eq!(lines, vec!["[download]  10.0%"]);
    }

    #[tokio::test]
    async fn test_large_output_does_not_stall() {
        let mut count = 0usize;
        let script = sh("i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done");
        let run = run_streaming("sh", &script, None, |_| count += 1);
        tokio::time::timeout(std::time::Duration::from_secs(30), run)
            .await
            .expect("runner stalled")
            .unwrap();
        assert_eq!(count, 20000);
    }

    #[test]
    fn test_truncate_keeps_tail() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 3), "…hij");
    }
}
