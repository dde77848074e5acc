//! 标注提示词
//!
//! 提示词对请求客户端是不透明的；这里只提供内置默认值和从文件加载

use crate::config::Config;
use crate::error::ConfigError;

/// 内置提示词：三项评估 × 每个群体，结果放在 ```json 代码块里
pub const DEFAULT_INSTRUCTION: &str = r#"### Task
Please analyze the provided image based on the following three image assessment tasks:
1. Image quality assessment: Evaluate the image based on low-level elements like technical quality, composition, color balance, lighting, sharpness, exposure, contrast, and overall visual impact. Choose one of the following: "positive", "normal", or "negative".
2. Image aesthetic assessment: Evaluate the aesthetic appeal of the image, focusing on elements like composition, color harmony, visual balance, and overall attractiveness. Choose one of the following: "positive", "normal", "negative".
3. Image emotional perception: Analyze the emotions the image evokes or conveys to viewers. Choose one of the following: "amusement", "excitement", "contentment", "awe", "disgust", "sadness", "fear" or "neutral".

### Information
There are the following 12 types of individuals. Based on your understanding of each group, role-play each group to complete the three tasks above.
Categorization by age: Age group 18 to 21, Age group 22 to 25, Age group 26 to 29, Age group 30 to 34, Age group 35 to 40.
Categorization by education: Junior College graduates, Junior High School graduates, Senior High School graduates, Technical Secondary School graduates, University graduates.
Categorization by gender: Female, Male.
Proceed step by step, so that the evaluation for each group is based on its own background and perspective, and the results for different groups do not influence one another.
After completing the tasks for each group, disregard these identity characteristics and objectively complete the three tasks once more without considering any group attributes.

### Response Format
Your output must contain a JSON block in the following format:
```json
{
    "age_18_to_21": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "age_22_to_25": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "age_26_to_29": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "age_30_to_34": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "age_35_to_40": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "JuniorCollege": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "JuniorHigh": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "SeniorHigh": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "TechnicalSecondarySchool": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "University": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "female": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "male": {"quality": "...", "aesthetic": "...", "emotion": "..."},
    "id_free": {"quality": "...", "aesthetic": "...", "emotion": "..."}
}
```

### Notes
- Do not indicate that you use additional information/context in your answer. Only use it implicitly to answer the questions.
"#;

/// 读取提示词：配置了文件则读文件，否则用内置提示词
pub fn load_instruction(config: &Config) -> Result<String, ConfigError> {
    match &config.prompt_file {
        Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.clone(),
            source,
        }),
        None => Ok(DEFAULT_INSTRUCTION.to_string()),
    }
}
