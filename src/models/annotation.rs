use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, warn};

/// 群体（模型被要求扮演的人群）
///
/// 序列化名称与结果文件中的键一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subgroup {
    #[serde(rename = "age_18_to_21")]
    Age18To21,
    #[serde(rename = "age_22_to_25")]
    Age22To25,
    #[serde(rename = "age_26_to_29")]
    Age26To29,
    #[serde(rename = "age_30_to_34")]
    Age30To34,
    #[serde(rename = "age_35_to_40")]
    Age35To40,
    JuniorCollege,
    JuniorHigh,
    SeniorHigh,
    TechnicalSecondarySchool,
    University,
    #[serde(rename = "female")]
    Female,
    #[serde(rename = "male")]
    Male,
    /// 不带身份特征的对照组
    #[serde(rename = "id_free")]
    IdFree,
}

impl Subgroup {
    pub const ALL: [Subgroup; 13] = [
        Subgroup::Age18To21,
        Subgroup::Age22To25,
        Subgroup::Age26To29,
        Subgroup::Age30To34,
        Subgroup::Age35To40,
        Subgroup::JuniorCollege,
        Subgroup::JuniorHigh,
        Subgroup::SeniorHigh,
        Subgroup::TechnicalSecondarySchool,
        Subgroup::University,
        Subgroup::Female,
        Subgroup::Male,
        Subgroup::IdFree,
    ];

    /// 结果文件中的键
    pub fn key(self) -> &'static str {
        match self {
            Subgroup::Age18To21 => "age_18_to_21",
            Subgroup::Age22To25 => "age_22_to_25",
            Subgroup::Age26To29 => "age_26_to_29",
            Subgroup::Age30To34 => "age_30_to_34",
            Subgroup::Age35To40 => "age_35_to_40",
            Subgroup::JuniorCollege => "JuniorCollege",
            Subgroup::JuniorHigh => "JuniorHigh",
            Subgroup::SeniorHigh => "SeniorHigh",
            Subgroup::TechnicalSecondarySchool => "TechnicalSecondarySchool",
            Subgroup::University => "University",
            Subgroup::Female => "female",
            Subgroup::Male => "male",
            Subgroup::IdFree => "id_free",
        }
    }

    /// 从键解析群体
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl Display for Subgroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// 一个群体对一张图片的三项判断
///
/// 解析时不校验取值，取值校验在批次结束后统一进行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub quality: String,
    pub aesthetic: String,
    pub emotion: String,
}

/// 一张图片的标注结果：群体 → 判断
///
/// 缺失的群体直接不出现，下游需要容忍不完整的记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AnnotationRecord(BTreeMap<Subgroup, Assessment>);

impl AnnotationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subgroup: Subgroup, assessment: Assessment) {
        self.0.insert(subgroup, assessment);
    }

    pub fn get(&self, subgroup: Subgroup) -> Option<&Assessment> {
        self.0.get(&subgroup)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Subgroup, &Assessment)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Subgroup, &mut Assessment)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 从 JSON 对象构建记录
    ///
    /// 未知键忽略；结构不对的群体丢弃；一个群体都没有时报错
    pub fn from_object(object: Map<String, JsonValue>) -> Result<Self, ParseError> {
        let mut record = Self::new();
        for (key, value) in object {
            let Some(subgroup) = Subgroup::from_key(&key) else {
                debug!("忽略未知群体键: {}", key);
                continue;
            };
            match serde_json::from_value::<Assessment>(value) {
                Ok(assessment) => record.insert(subgroup, assessment),
                Err(e) => warn!("群体 {} 的结构不完整，已丢弃: {}", subgroup, e),
            }
        }

        if record.is_empty() {
            return Err(ParseError::NoSubgroups);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for AnnotationRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let object = Map::<String, JsonValue>::deserialize(deserializer)?;
        AnnotationRecord::from_object(object).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subgroup_keys_round_trip() {
        for subgroup in Subgroup::ALL {
            assert_eq!(Subgroup::from_key(subgroup.key()), Some(subgroup));
            let serialized = serde_json::to_value(subgroup).unwrap();
            assert_eq!(serialized, json!(subgroup.key()));
        }
        assert_eq!(Subgroup::from_key("age_41_to_50"), None);
    }

    #[test]
    fn test_from_object_keeps_known_and_drops_broken() {
        let object = json!({
            "male": {"quality": "positive", "aesthetic": "normal", "emotion": "awe"},
            "female": {"quality": "positive"},
            "martians": {"quality": "negative", "aesthetic": "negative", "emotion": "fear"}
        });
        let JsonValue::Object(object) = object else {
            unreachable!()
        };

        let record = AnnotationRecord::from_object(object).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(Subgroup::Male).unwrap().emotion, "awe");
        assert!(record.get(Subgroup::Female).is_none());
    }

    #[test]
    fn test_from_object_without_subgroups_fails() {
        let result = AnnotationRecord::from_object(Map::new());
        assert!(matches!(result, Err(ParseError::NoSubgroups)));
    }

    #[test]
    fn test_serializes_in_canonical_order() {
        let mut record = AnnotationRecord::new();
        let assessment = Assessment {
            quality: "normal".to_string(),
            aesthetic: "normal".to_string(),
            emotion: "neutral".to_string(),
        };
        record.insert(Subgroup::IdFree, assessment.clone());
        record.insert(Subgroup::Age18To21, assessment);

        let text = serde_json::to_string(&record).unwrap();
        let first = text.find("age_18_to_21").unwrap();
        let last = text.find("id_free").unwrap();
        assert!(first < last);
    }
}
