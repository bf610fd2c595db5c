//! Discount code generation.

use rand::Rng;

use questline_core::QuestId;
use questline_quests::RewardType;

const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 4;
const QUEST_FRAGMENT_LEN: usize = 8;

pub fn code_prefix(reward_type: RewardType) -> &'static str {
    match reward_type {
        RewardType::FreeShipping => "FREESHIP",
        _ => "QUEST",
    }
}

/// `{PREFIX}-{quest fragment}-{random suffix}`, e.g. `QUEST-0192F3A1-K7Q2`.
pub fn generate_code(reward_type: RewardType, quest_id: QuestId) -> String {
    let fragment: String = quest_id
        .to_string()
        .chars()
        .filter(|c| *c != '-')
        .take(QUEST_FRAGMENT_LEN)
        .collect::<String>()
        .to_ascii_uppercase();

    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();

    format!("{}-{}-{}", code_prefix(reward_type), fragment, suffix)
}
