//! Reward attachment policy
//!
//! Detects "give me a reward" intent, plans a probabilistic attach
//! decision with a tone label the prompt can allude to, strips the
//! post-hoc training classification tag from AI output, and picks a
//! random asset from the reward pool.

use std::path::PathBuf;
use std::sync::LazyLock;

use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;

static REQUEST_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(ちょうだい|ちょーだい|頂戴|くれ|ください|送って|ほしい|欲しい|見せて|みせて|見たい|みたい)")
        .expect("valid regex")
});
static REWARD_NOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(ご褒美|ごほうび)").expect("valid regex"));
static IMAGE_NOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)(画像|写真|pic|picture|photo|image)").expect("valid regex"));
static TRAINING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\[TRAINING:(YES|NO)\]\s*").expect("valid regex"));

/// Tone label passed to the AI prompt so generated text can allude to
/// the planned attachment consistently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardTone {
    /// A reward is planned; the reply may mention it
    Send,
    /// A reward was asked for but is being withheld this time
    Hold,
    /// No reward mention at all
    None,
}

/// Pre-generation attach plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPlan {
    /// Whether the coin flip came up attach
    pub attach: bool,
    /// Tone label for the prompt
    pub tone: RewardTone,
}

/// Whether the text asks for a reward: a reward noun or an image noun,
/// combined with a request verb
#[must_use]
pub fn wants_reward(text: &str) -> bool {
    let verb = REQUEST_VERB.is_match(text);
    (REWARD_NOUN.is_match(text) && verb) || (IMAGE_NOUN.is_match(text) && verb)
}

/// Plan the attachment for a text message.
///
/// On request the attach probability is the higher on-request rate and
/// a losing draw yields the "next time" `Hold` tone; ambient traffic
/// draws at the lower rate with no reward mention on a loss.
#[must_use]
pub fn plan_text(
    wants: bool,
    on_request_rate: f64,
    ambient_rate: f64,
    rng: &mut impl Rng,
) -> RewardPlan {
    let attach = if wants {
        rng.gen_bool(on_request_rate.clamp(0.0, 1.0))
    } else {
        rng.gen_bool(ambient_rate.clamp(0.0, 1.0))
    };
    let tone = if attach {
        RewardTone::Send
    } else if wants {
        RewardTone::Hold
    } else {
        RewardTone::None
    };
    RewardPlan { attach, tone }
}

/// Plan the attachment for an image message: ambient rate only, no
/// `Hold` tone since images carry no request text
#[must_use]
pub fn plan_image(ambient_rate: f64, rng: &mut impl Rng) -> RewardPlan {
    let attach = rng.gen_bool(ambient_rate.clamp(0.0, 1.0));
    RewardPlan {
        attach,
        tone: if attach {
            RewardTone::Send
        } else {
            RewardTone::None
        },
    }
}

/// Result of stripping the leading training classification tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingTag {
    /// Reply text with the tag removed
    pub clean: String,
    /// `Some(true)` for `[TRAINING:YES]`, `Some(false)` for
    /// `[TRAINING:NO]`, `None` when the tag is missing or garbled
    pub training: Option<bool>,
}

/// Strip a leading `[TRAINING:YES|NO]` tag from AI output.
///
/// A missing or malformed tag leaves the text unchanged with an
/// unknown classification; the reward decision then falls back to the
/// pre-generation plan.
#[must_use]
pub fn extract_training_tag(raw: &str) -> TrainingTag {
    TRAINING_TAG.captures(raw).map_or_else(
        || TrainingTag {
            clean: raw.to_string(),
            training: None,
        },
        |cap| TrainingTag {
            clean: TRAINING_TAG.replace(raw, "").into_owned(),
            training: Some(cap[1].eq_ignore_ascii_case("yes")),
        },
    )
}

/// Final attach decision: a genuine training report always earns the
/// reward, overriding the coin flip
#[must_use]
pub const fn should_attach(is_training_report: bool, plan: RewardPlan) -> bool {
    is_training_report || plan.attach
}

/// A picked reward asset as a URL pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardAsset {
    /// Full-size URL
    pub original: String,
    /// Preview URL (same asset)
    pub preview: String,
}

/// Reward image pool backed by a directory of static assets
#[derive(Debug, Clone)]
pub struct RewardPool {
    dir: PathBuf,
    base_url: String,
}

impl RewardPool {
    /// Create a pool over `dir`, publishing URLs under
    /// `{base_url}/rewards/`
    #[must_use]
    pub fn new(dir: PathBuf, base_url: String) -> Self {
        Self { dir, base_url }
    }

    /// Pick a random asset, or `None` when the pool is missing or
    /// empty. Consulted at send time; emptiness silently downgrades
    /// the reply to text-only.
    #[must_use]
    pub fn pick(&self) -> Option<RewardAsset> {
        let files: Vec<String> = std::fs::read_dir(&self.dir)
            .ok()?
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                let lower = name.to_lowercase();
                lower.ends_with(".png") || lower.ends_with(".jpg") || lower.ends_with(".jpeg")
            })
            .collect();

        let file = files.choose(&mut rand::thread_rng())?;
        let url = format!("{}/rewards/{}", self.base_url, urlencoding::encode(file));
        Some(RewardAsset {
            original: url.clone(),
            preview: url,
        })
    }
}
