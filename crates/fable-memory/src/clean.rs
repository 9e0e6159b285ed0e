//! Line-level cleaning applied to history entries before they enter an
//! actor's memory.

use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>").expect("line break pattern is valid"));

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]+>").expect("tag pattern is valid"));

static SYSTEM_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:system)|系统)\s*[:：]|^[\[【(（]\s*(?:(?i:system)|系统)\s*[\]】)）]")
        .expect("system author pattern is valid")
});

static STORY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:current story time|当前故事时间)\s*[:：]\s*(.+?)\s*[,，;；]\s*(?:world state|世界状态)\s*[:：]\s*(.+)",
    )
    .expect("story time pattern is valid")
});

/// Notices about new characters arriving or new places being found.
const POPULATION_PHRASES: &[&str] = &[
    "new character appeared",
    "has joined the world",
    "discovered a new location",
    "new location discovered",
    "新角色登场",
    "新人物加入",
    "发现了新地点",
    "新地点已发现",
];

/// Round settlement and desire fulfilment bookkeeping.
const SETTLEMENT_PHRASES: &[&str] = &[
    "round settlement",
    "[settlement]",
    "settlement complete",
    "desire fulfilled",
    "desire has been fulfilled",
    "回合结算",
    "【结算】",
    "结算完成",
    "欲望已满足",
    "愿望达成",
];

/// Engine announcements and world-setting edits.
const ENGINE_PHRASES: &[&str] = &[
    "[engine]",
    "engine notice",
    "setting updated",
    "world setting changed",
    "【引擎】",
    "设定已更新",
    "世界设定变更",
];

const FAST_TRAVEL_PHRASES: &[&str] = &["fast travel", "fast-travel", "fast traveled", "快速旅行", "快速移动", "瞬移至"];

/// Marker lines containing one of these survive.
const MARKER_ALLOW_LIST: &[&str] = &[
    "acquire", "obtain", "trade", "draw", "drew", "deposit", "inspect", "discover", "move", "consume", "获得", "交易",
    "抽取", "存入", "查看", "发现", "移动", "消耗",
];

const SKILL_ACTIVATION_PHRASES: &[&str] = &[
    "activated a skill",
    "activated the skill",
    "activates a skill",
    "发动了技能",
    "使用了技能",
];

const SUCCESS_MARKERS: &[&str] = &["[Success]", "[success]", "【成功】", "(Success)", "（成功）"];

/// Remove HTML markup, turning line-level tags into newlines.
pub fn strip_html(text: &str) -> String {
    let with_breaks = LINE_BREAK_TAG.replace_all(text, "\n");
    HTML_TAG
        .replace_all(&with_breaks, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn is_meta_line(lower: &str) -> bool {
    [POPULATION_PHRASES, SETTLEMENT_PHRASES, ENGINE_PHRASES, FAST_TRAVEL_PHRASES]
        .iter()
        .any(|phrases| contains_any(lower, phrases))
}

fn is_marker_line(line: &str) -> bool {
    line.starts_with('>') || line.starts_with('＞')
}

fn clean_line(line: &str, past_round: bool) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || SYSTEM_AUTHOR.is_match(line) {
        return None;
    }

    let lower = line.to_lowercase();
    if is_meta_line(&lower) {
        return None;
    }
    if is_marker_line(line) && !contains_any(&lower, MARKER_ALLOW_LIST) {
        return None;
    }
    if past_round && contains_any(&lower, SKILL_ACTIVATION_PHRASES) {
        return None;
    }

    let mut cleaned = STORY_TIME.replace(line, "$1, $2").into_owned();
    if past_round {
        for marker in SUCCESS_MARKERS {
            cleaned = cleaned.replace(marker, "");
        }
    }

    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Clean one entry's content. `past_round` enables the extra rules for
/// rounds strictly older than the current one. `None` when nothing is left.
pub fn clean_entry_text(content: &str, past_round: bool) -> Option<String> {
    let lines: Vec<String> = strip_html(content)
        .lines()
        .filter_map(|line| clean_line(line, past_round))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}
