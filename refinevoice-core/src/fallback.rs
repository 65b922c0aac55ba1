//! Deterministic simplified-to-traditional normalizer used whenever the model
//! path cannot produce a usable result.
//!
//! The builtin table is an approximation: phrase entries cover Taiwan
//! terminology (software, network, file, account vocabulary) and the
//! character entries cover common one-to-one simplified forms. Ambiguous
//! characters (one simplified form, several traditional ones) are left out.

use crate::config::ConfigError;
use crate::text::{collapse_whitespace, ensure_terminal_punctuation, strip_tokens};
use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Returned for blank input so callers always get a non-empty string.
pub const EMPTY_PLACEHOLDER: &str = "…";

const BUILTIN_PHRASES: &[(&str, &str)] = &[
    // Longer entries first: earlier entries win at the same position.
    ("应用程序", "應用程式"),
    ("操作系统", "作業系統"),
    ("人工智能", "人工智慧"),
    ("计算机", "電腦"),
    ("打印机", "印表機"),
    ("服务器", "伺服器"),
    ("数据库", "資料庫"),
    ("用户名", "使用者名稱"),
    ("互联网", "網際網路"),
    ("软件", "軟體"),
    ("硬件", "硬體"),
    ("网络", "網路"),
    ("网站", "網站"),
    ("网页", "網頁"),
    ("信息", "資訊"),
    ("程序", "程式"),
    ("设置", "設定"),
    ("文件", "檔案"),
    ("用户", "使用者"),
    ("应用", "應用"),
    ("系统", "系統"),
    ("数据", "資料"),
    ("处理", "處理"),
    ("连接", "連線"),
    ("下载", "下載"),
    ("上传", "上傳"),
    ("存储", "儲存"),
    ("视频", "影片"),
    ("音频", "音訊"),
    ("图片", "圖片"),
    ("照片", "相片"),
    ("打开", "開啟"),
    ("关闭", "關閉"),
    ("保存", "儲存"),
    ("删除", "刪除"),
    ("账户", "帳戶"),
    ("账号", "帳號"),
    ("密码", "密碼"),
    ("登录", "登入"),
    ("注册", "註冊"),
    ("默认", "預設"),
    ("屏幕", "螢幕"),
    ("鼠标", "滑鼠"),
    ("内存", "記憶體"),
    ("硬盘", "硬碟"),
    ("质量", "品質"),
    ("项目", "專案"),
    ("界面", "介面"),
    ("菜单", "選單"),
    ("短信", "簡訊"),
    ("邮件", "郵件"),
    ("邮箱", "信箱"),
    ("搜索", "搜尋"),
];

// Space-separated `<simplified><traditional>` pairs.
const BUILTIN_CHARS: &str = "\
这這 个個 们們 问問 题題 说說 话話 语語 时時 间間 会會 来來 对對 为為 没沒 还還 过過 学學 见見 \
现現 点點 东東 车車 长長 门門 开開 关關 头頭 马馬 鸟鳥 鱼魚 龙龍 书書 买買 卖賣 写寫 听聽 读讀 认認 \
识識 请請 让讓 谢謝 经經 济濟 进進 运運 动動 办辦 务務 业業 发發 后後 里裡 样樣 应應 该該 给給 边邊 \
从從 两兩 几幾 号號 电電 脑腦 机機 网網 络絡 软軟 设設 计計 处處 国國 实實 产產 众眾 传傳 体體 么麼 \
仅僅 仓倉 价價 优優 伤傷 亿億 华華 协協 单單 卫衛 历歷 压壓 厅廳 县縣 参參 双雙 变變 叶葉 叹嘆 吗嗎 \
员員 启啟 响響 园園 围圍 图圖 圣聖 场場 坏壞 块塊 坚堅 报報 声聲 备備 夹夾 夺奪 奋奮 妈媽 妇婦 孙孫 \
宁寧 宝寶 宽寬 导導 寿壽 将將 尔爾 尘塵 尽盡 层層 岁歲 岛島 币幣 师師 带帶 帮幫 广廣 庆慶 库庫 废廢 \
异異 张張 弹彈 强強 归歸 录錄 彻徹 忆憶 忧憂 怀懷 态態 总總 恋戀 恶惡 悬懸 惊驚 惯慣 战戰 戏戲 户戶 \
扩擴 扫掃 扬揚 扰擾 抢搶 护護 担擔 拥擁 择擇 挂掛 挤擠 换換 据據 损損 摄攝 摆擺 敌敵 数數 断斷 无無 \
旧舊 显顯 晓曉 暂暫 术術 权權 条條 杨楊 极極 构構 枪槍 档檔 桥橋 检檢 楼樓 欢歡 欧歐 毕畢 气氣 汇匯 \
汉漢 汤湯 沟溝 泪淚 洁潔 浅淺 测測 浓濃 涨漲 润潤 涩澀 温溫 湾灣 满滿 灭滅 灯燈 灵靈 灾災 炼煉 热熱 \
爱愛 爷爺 牵牽 犹猶 状狀 独獨 狮獅 猎獵 猫貓 环環 画畫 畅暢 疗療 盖蓋 盘盤 着著 确確 础礎 礼禮 离離 \
种種 积積 称稱 稳穩 穷窮 竞競 笔筆 笼籠 签簽 简簡 类類 粮糧 紧緊 红紅 约約 级級 纪紀 纯純 纸紙 线線 \
练練 组組 细細 终終 结結 绝絕 统統 继繼 续續 维維 综綜 绿綠 缓緩 编編 缩縮 罗羅 职職 联聯 聪聰 肃肅 \
肤膚 肿腫 胜勝 胆膽 艺藝 节節 芦蘆 苏蘇 荣榮 药藥 获獲 营營 虽雖 蚁蟻 补補 衬襯 观觀 规規 视視 览覽 \
觉覺 订訂 讨討 训訓 议議 讯訊 记記 讲講 许許 论論 访訪 证證 评評 诉訴 词詞 译譯 试試 诗詩 诚誠 询詢 \
详詳 误誤 诸諸 课課 谁誰 调調 谈談 谋謀 贝貝 负負 贡貢 财財 责責 败敗 货貨 质質 购購 贯貫 费費 贴貼 \
贵貴 贸貿 资資 赏賞 赔賠 赛賽 赞贊 赢贏 赶趕 趋趨 跃躍 践踐 踪蹤 转轉 轮輪 轻輕 载載 较較 辅輔 辆輛 \
辈輩 输輸 辞辭 达達 迁遷 迈邁 远遠 违違 连連 迟遲 适適 选選 递遞 逻邏 遗遺 邮郵 邻鄰 郑鄭 酱醬 释釋 \
钟鐘 钢鋼 钱錢 铁鐵 银銀 链鏈 锁鎖 错錯 键鍵 闭閉 闲閒 闻聞 阅閱 队隊 阳陽 阴陰 阵陣 际際 陆陸 险險 \
随隨 隐隱 难難 雾霧 静靜 韩韓 页頁 顶頂 项項 顺順 须須 顾顧 顿頓 预預 领領 频頻 颜顏 额額 风風 飞飛 \
饭飯 饮飲 馆館 驱驅 验驗 骑騎 鸡雞 麦麥 黄黃 齐齊 龄齡";

/// Swappable substitution data. Phrases are applied before characters, and in
/// table order when two phrases start at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTable {
    pub phrases: Vec<(String, String)>,
    pub chars: Vec<(char, char)>,
}

impl ConversionTable {
    pub fn builtin() -> Self {
        let phrases = BUILTIN_PHRASES
            .iter()
            .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
            .collect();

        let chars = BUILTIN_CHARS
            .split_whitespace()
            .filter_map(|pair| {
                let mut it = pair.chars();
                Some((it.next()?, it.next()?))
            })
            .collect();

        Self { phrases, chars }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((from, _)) = self.phrases.iter().find(|(from, _)| from.is_empty()) {
            return Err(ConfigError::ConversionTable(format!(
                "empty phrase key (entry {from:?})"
            )));
        }

        let mut seen = HashSet::new();
        for (from, _) in &self.chars {
            if !seen.insert(*from) {
                return Err(ConfigError::ConversionTable(format!(
                    "duplicate character entry: {from}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone)]
pub struct FallbackConverter {
    phrases: Vec<(String, String)>,
    phrase_matcher: Option<AhoCorasick>,
    chars: HashMap<char, char>,
    stripped_tokens: Vec<String>,
}

impl FallbackConverter {
    pub fn new(table: ConversionTable) -> Result<Self, ConfigError> {
        table.validate()?;

        let phrase_matcher = if table.phrases.is_empty() {
            None
        } else {
            let matcher = AhoCorasick::builder()
                .match_kind(MatchKind::LeftmostFirst)
                .build(table.phrases.iter().map(|(from, _)| from.as_str()))
                .map_err(|e| ConfigError::ConversionTable(e.to_string()))?;
            Some(matcher)
        };

        Ok(Self {
            phrases: table.phrases,
            phrase_matcher,
            chars: table.chars.into_iter().collect(),
            stripped_tokens: vec![],
        })
    }

    pub fn builtin() -> Self {
        Self::new(ConversionTable::builtin()).expect("builtin conversion table is valid")
    }

    /// Tokens (completion markers) that must never survive into the output.
    pub fn with_stripped_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stripped_tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.is_empty())
            .collect();
        self
    }

    /// Total: never fails, never returns an empty string.
    pub fn convert(&self, text: &str) -> String {
        let (stripped, removed) = strip_tokens(text, &self.stripped_tokens);
        let cleaned = if removed {
            collapse_whitespace(&stripped)
        } else {
            stripped.trim().to_string()
        };

        if cleaned.is_empty() {
            return EMPTY_PLACEHOLDER.to_string();
        }

        ensure_terminal_punctuation(&self.substitute(&cleaned))
    }

    /// Phrase pass then character pass, without punctuation handling.
    /// Replacement output is never re-scanned.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        if let Some(matcher) = &self.phrase_matcher {
            for m in matcher.find_iter(text) {
                self.push_chars(&mut out, &text[last..m.start()]);
                out.push_str(&self.phrases[m.pattern().as_usize()].1);
                last = m.end();
            }
        }

        self.push_chars(&mut out, &text[last..]);
        out
    }

    fn push_chars(&self, out: &mut String, span: &str) {
        out.extend(span.chars().map(|c| *self.chars.get(&c).unwrap_or(&c)));
    }
}

impl Default for FallbackConverter {
    fn default() -> Self {
        Self::builtin()
    }
}
