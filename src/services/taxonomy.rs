//! 取值校验 / 规范化 - 业务能力层
//!
//! 在整个批次结束后对结果统一执行，不在逐张请求时进行。
//! quality / aesthetic 取值为 positive、normal、negative；
//! emotion 取值为八种情绪之一。

use crate::models::{AnnotationRecord, StoredEntry};
use crate::services::ResultStore;
use phf::{phf_map, phf_set};
use std::collections::{BTreeMap, BTreeSet};

/// quality / aesthetic 的合法取值
pub static RATINGS: phf::Set<&'static str> = phf_set! {
    "positive", "normal", "negative",
};

/// emotion 的合法取值
pub static EMOTIONS: phf::Set<&'static str> = phf_set! {
    "amusement", "excitement", "contentment", "awe",
    "disgust", "sadness", "fear", "neutral",
};

/// 模型常见的非标准情绪词 → 标准情绪
static EMOTION_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    // 误用了评分词
    "normal" => "neutral",
    "negative" => "sadness",
    "positive" => "contentment",
    // 积极情绪
    "adventure" => "excitement",
    "inspiration" => "awe",
    "hope" => "contentment",
    "confidence" => "contentment",
    "curiosity" => "excitement",
    "interest" => "excitement",
    "comfort" => "contentment",
    "relaxation" => "contentment",
    "respect" => "awe",
    "nostalgia" => "contentment",
    // 消极情绪
    "anger" => "disgust",
    "disappointment" => "sadness",
    "unease" => "fear",
    "loneliness" => "sadness",
    "stress" => "fear",
    "frustration" => "disgust",
    "anxiety" => "fear",
    "confusion" => "neutral",
    "concern" => "fear",
};

/// 评估维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aspect {
    Quality,
    Aesthetic,
    Emotion,
}

impl Aspect {
    pub fn name(self) -> &'static str {
        match self {
            Aspect::Quality => "quality",
            Aspect::Aesthetic => "aesthetic",
            Aspect::Emotion => "emotion",
        }
    }

    fn is_valid(self, value: &str) -> bool {
        match self {
            Aspect::Quality | Aspect::Aesthetic => RATINGS.contains(value),
            Aspect::Emotion => EMOTIONS.contains(value),
        }
    }
}

/// 校验报告
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// 每个维度出现过的非法取值
    pub invalid_values: BTreeMap<Aspect, BTreeSet<String>>,
    /// 含非法取值的图片
    pub affected_images: BTreeSet<String>,
    /// 检查过的成功记录数
    pub checked: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.affected_images.is_empty()
    }
}

/// 检查所有成功记录的取值
pub fn validate(store: &ResultStore) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (id, entry) in store.entries() {
        let StoredEntry::Success(record) = entry else {
            continue;
        };
        report.checked += 1;

        for (_, assessment) in record.iter() {
            let fields = [
                (Aspect::Quality, &assessment.quality),
                (Aspect::Aesthetic, &assessment.aesthetic),
                (Aspect::Emotion, &assessment.emotion),
            ];
            for (aspect, value) in fields {
                if !aspect.is_valid(value) {
                    report
                        .invalid_values
                        .entry(aspect)
                        .or_default()
                        .insert(value.clone());
                    report.affected_images.insert(id.clone());
                }
            }
        }
    }

    report
}

/// 规范化一条记录，返回修改过的字段数
///
/// 去掉首尾空白并转小写；emotion 再按别名表映射
pub fn normalize_record(record: &mut AnnotationRecord) -> usize {
    let mut changed = 0;
    for (_, assessment) in record.iter_mut() {
        changed += normalize_value(&mut assessment.quality, None);
        changed += normalize_value(&mut assessment.aesthetic, None);
        changed += normalize_value(&mut assessment.emotion, Some(&EMOTION_ALIASES));
    }
    changed
}

fn normalize_value(value: &mut String, aliases: Option<&phf::Map<&'static str, &'static str>>) -> usize {
    let mut normalized = value.trim().to_lowercase();
    if let Some(target) = aliases.and_then(|map| map.get(normalized.as_str())) {
        normalized = (*target).to_string();
    }
    if normalized == *value {
        0
    } else {
        *value = normalized;
        1
    }
}

/// 规范化整个存储，返回修改过的字段数
pub fn normalize_store(store: &mut ResultStore) -> usize {
    store
        .entries_mut()
        .values_mut()
        .map(|entry| match entry {
            StoredEntry::Success(record) => normalize_record(record),
            StoredEntry::Failure(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assessment, ErrorRecord, Subgroup};

    fn record(quality: &str, aesthetic: &str, emotion: &str) -> AnnotationRecord {
        let mut record = AnnotationRecord::new();
        record.insert(
            Subgroup::Female,
            Assessment {
                quality: quality.to_string(),
                aesthetic: aesthetic.to_string(),
                emotion: emotion.to_string(),
            },
        );
        record
    }

    #[test]
    fn test_validate_reports_invalid_values() {
        let mut store = ResultStore::empty("unused.json");
        store.put("a.jpg", record("positive", "normal", "awe"));
        store.put("b.jpg", record("great", "normal", "hope"));
        store.put("c.jpg", ErrorRecord::transport("timeout"));

        let report = validate(&store);
        assert_eq!(report.checked, 2);
        assert!(!report.is_clean());
        assert_eq!(report.affected_images.len(), 1);
        assert!(report.invalid_values[&Aspect::Quality].contains("great"));
        assert!(report.invalid_values[&Aspect::Emotion].contains("hope"));
        assert!(!report.invalid_values.contains_key(&Aspect::Aesthetic));
    }

    #[test]
    fn test_normalize_maps_aliases_and_case() {
        let mut rec = record(" Positive ", "NORMAL", "Anxiety");
        let changed = normalize_record(&mut rec);

        let assessment = rec.get(Subgroup::Female).unwrap();
        assert_eq!(changed, 3);
        assert_eq!(assessment.quality, "positive");
        assert_eq!(assessment.aesthetic, "normal");
        assert_eq!(assessment.emotion, "fear");
    }

    #[test]
    fn test_normalize_then_validate_is_clean() {
        let mut store = ResultStore::empty("unused.json");
        store.put("a.jpg", record("positive", "negative", "nostalgia"));
        store.put("b.jpg", record("normal", "normal", "normal"));

        assert!(!validate(&store).is_clean());
        assert_eq!(normalize_store(&mut store), 2);
        assert!(validate(&store).is_clean());
        // 再次规范化不会改动
        assert_eq!(normalize_store(&mut store), 0);
    }

    #[test]
    fn test_rating_words_are_not_remapped() {
        let mut rec = record("negative", "positive", "sadness");
        assert_eq!(normalize_record(&mut rec), 0);
    }
}
