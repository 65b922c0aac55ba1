use refinevoice_engine::traits::UserStats;
use std::time::{Duration, UNIX_EPOCH};

pub const PROCESSING: &str = "🎧 正在處理您的語音訊息，請稍候...";

pub const HELP: &str = "🎤 語音文字助手使用說明

✨ 功能：
• 語音轉文字
• AI 多階段文字優化
• 繁體中文輸出
• 使用記錄統計

📱 使用方法：
1. 發送語音訊息進行轉文字
2. 發送文字訊息進行優化
3. 輸入「狀態」查看使用記錄
4. 輸入「幫助」查看此說明

⚡ 指令：
• help/幫助/說明 - 顯示使用說明
• status/狀態 - 查看使用統計";

pub const NO_RECORDS: &str = "📊 暫無使用記錄";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand<'a> {
    Help,
    Status,
    Refine(&'a str),
}

pub fn parse_text_command(text: &str) -> TextCommand<'_> {
    let trimmed = text.trim();
    match trimmed.to_lowercase().as_str() {
        "help" | "幫助" | "說明" => TextCommand::Help,
        "status" | "狀態" => TextCommand::Status,
        _ => TextCommand::Refine(trimmed),
    }
}

pub fn audio_result(original: &str, refined: &str) -> String {
    format!("✨ 語音轉文字完成\n\n🎯 原始文字：\n{original}\n\n📝 AI 優化結果：\n{refined}")
}

pub fn text_result(refined: &str) -> String {
    format!("📝 文字優化結果：\n{refined}")
}

pub fn retry_prompt(reason: &str) -> String {
    format!("❌ {reason}\n\n請重新發送語音訊息。")
}

pub fn status(stats: &UserStats) -> String {
    if stats.total() == 0 {
        return NO_RECORDS.to_string();
    }

    format!(
        "📊 您的使用統計\n\n🎤 語音處理次數: {}\n📝 文字處理次數: {}\n📅 首次使用: {}\n🕒 最後使用: {}",
        stats.audio_count,
        stats.text_count,
        format_ts(stats.first_use_ms),
        format_ts(stats.last_use_ms),
    )
}

fn format_ts(ms: Option<i64>) -> String {
    match ms.and_then(|ms| u64::try_from(ms).ok()) {
        Some(ms) => {
            humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_millis(ms)).to_string()
        }
        None => "未知".into(),
    }
}
