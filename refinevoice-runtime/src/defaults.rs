use refinevoice_core::{AppConfig, DeterministicRule, StageSpec};

pub const TRANSCRIPT_FILTER_ID: &str = "transcript_filter";
pub const CONTENT_OPTIMIZER_ID: &str = "content_optimizer";
pub const TRADITIONAL_CONVERTER_ID: &str = "traditional_chinese_converter";

const CONTENT_OPTIMIZER_INSTRUCTION: &str = "你是專業的文字內容優化專家。

任務：
1. 修正語音辨識錯誤與斷句錯誤
2. 補上遺漏的標點符號
3. 修正同音異字（如：的/得、在/再、做/作）
4. 整理語句結構，刪除冗餘表達，保留說話者的語氣

只輸出優化後的文字，不要加入任何說明。";

const TRADITIONAL_CONVERTER_INSTRUCTION: &str = "你是專業的繁體中文轉換專家。

任務：
1. 將所有簡體字轉換為繁體字
2. 使用台灣常用的詞彙與表達方式
3. 不要改動文字的意思

常見對照：软件→軟體、网络→網路、信息→資訊、程序→程式、设置→設定、文件→檔案、用户→使用者、数据→資料。

只輸出轉換後的文字，不要加入任何說明。";

pub fn default_stage_specs() -> Vec<StageSpec> {
    vec![
        StageSpec::deterministic(TRANSCRIPT_FILTER_ID, DeterministicRule::TranscriptFilter),
        StageSpec::ai_delegate(CONTENT_OPTIMIZER_ID, CONTENT_OPTIMIZER_INSTRUCTION),
        StageSpec::ai_delegate(TRADITIONAL_CONVERTER_ID, TRADITIONAL_CONVERTER_INSTRUCTION),
    ]
}

pub fn default_app_config() -> AppConfig {
    AppConfig {
        stages: default_stage_specs(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinevoice_core::DEFAULT_COMPLETION_MARKER;

    #[test]
    fn default_config_is_valid() {
        let cfg = default_app_config();
        cfg.validate().unwrap();
        assert_eq!(
            cfg.stages.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec![
                TRANSCRIPT_FILTER_ID,
                CONTENT_OPTIMIZER_ID,
                TRADITIONAL_CONVERTER_ID
            ]
        );
        assert_eq!(cfg.completion_markers(), vec![DEFAULT_COMPLETION_MARKER]);
    }
}
