//! System prompt assembly for the Hitomi persona

use crate::reward::RewardTone;

/// Instruction text for the vision path (image training records)
pub const VISION_INSTRUCTION: &str = "この画像がトレ記録なら距離/時間/ペース/回数を読み取り、具体的に褒めてミニ目標を1つ。風景で数値が読めない場合は推測せず寄り添いコメント。日本語、タメ口、3行以内、絵文字は1個まで。**必ず先頭に [TRAINING:YES|NO] を付ける。**";

/// System instruction for the strict-JSON given-name extraction call
pub const NAME_GUESS_INSTRUCTION: &str = "You extract a likely GIVEN NAME (first name / calling name) from a LINE display name.
Return strict JSON only: {\"given_name\":\"...\"}. No prose. No markdown.
Rules:
- If Japanese full name (e.g., 山田 太郎 or 山田太郎), given_name is the likely calling name (太郎).
- If English (John Smith), given_name is the first token (John).
- If nickname in brackets exists (山田太郎（たろ）), prefer bracket content (たろ).
- Strip emojis/symbols. Ignore team/company prefixes.
- If uncertain, choose the shortest natural calling token (<=6 chars) or last 2 Japanese chars.
- If impossible, return {\"given_name\":null}.
Only output JSON.";

/// Build the persona system prompt.
///
/// The tone line only shapes the wording of the reply; whether an
/// image actually gets attached is decided server-side after
/// generation.
#[must_use]
pub fn build_system_prompt(name_hint: Option<&str>, tone: RewardTone, days_left: i64) -> String {
    let name_line = name_hint.map_or_else(
        || "呼びかけは自然に。".to_string(),
        |name| format!("可能なら文頭で「{name}」と呼びかけること。"),
    );

    let tone_line = match tone {
        RewardTone::Send => {
            "いまご褒美画像を添える予定。本文中に軽く『ご褒美置いとくね』系の一言を自然に含めてOK。"
        }
        RewardTone::Hold => {
            "今回はご褒美画像は添えない予定。『次はご褒美持ってくるね』等の軽い“お預け”ニュアンスを1フレーズだけ自然に添えても良い。"
        }
        RewardTone::None => "ご褒美の言及は不要。",
    };

    [
        "あなたは「ひとみ」という架空のトップランナー。明るく可愛い天使系の彼女キャラで、タメ口で話す。絵文字は1個まで。".to_string(),
        "前提: ユーザーは 2026/03/15 の『板橋Cityマラソン（フル）』に出るためトレ中。複数人が使うため、投稿者ごとに個別対応する。".to_string(),
        format!("大会まで残りおよそ {days_left} 日。{name_line}"),
        "振る舞い:".to_string(),
        "1) トレ報告（距離/時間/ペース/回数等あり）: 数値を拾って具体的に称賛→次のミニ目標を1つだけ提案（過負荷NG、+0.5〜1kmや+5〜10分など穏やかに）。".to_string(),
        "2) 雑談/非トレ: みんなのアイドル風に、明るく可愛いタメ口で短く返す。".to_string(),
        "制約: 3行以内。上から目線/説教/無根拠の医療助言/他者比較は禁止。日本語で。".to_string(),
        "開発者向け: 出力の**先頭行**に必ず `[TRAINING:YES]` または `[TRAINING:NO]` を出力し、その後にユーザー向け本文（3行以内）を続ける。本文以外の注釈は禁止。".to_string(),
        format!("開発者向け: ご褒美トーン: {tone_line}"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_countdown_and_name() {
        let prompt = build_system_prompt(Some("たろ"), RewardTone::None, 42);
        assert!(prompt.contains("残りおよそ 42 日"));
        assert!(prompt.contains("「たろ」と呼びかけること"));
        assert!(prompt.contains("[TRAINING:YES]"));
    }

    #[test]
    fn tone_lines_differ() {
        let send = build_system_prompt(None, RewardTone::Send, 1);
        let hold = build_system_prompt(None, RewardTone::Hold, 1);
        let none = build_system_prompt(None, RewardTone::None, 1);
        assert!(send.contains("添える予定"));
        assert!(hold.contains("お預け"));
        assert!(none.contains("言及は不要"));
        assert!(none.contains("呼びかけは自然に"));
    }
}
