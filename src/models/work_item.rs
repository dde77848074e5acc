use std::fmt::Display;
use std::path::PathBuf;

/// 一张待标注的图片
///
/// 由语料遍历器在枚举时创建，之后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 所属组（顶层子目录名）
    pub group: String,
    /// 文件名，同时作为结果文件中的键
    pub file_name: String,
    /// 绝对路径
    pub path: PathBuf,
}

impl WorkItem {
    pub fn new(group: impl Into<String>, file_name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            group: group.into(),
            file_name: file_name.into(),
            path,
        }
    }

    /// 结果文件中的键
    pub fn id(&self) -> &str {
        &self.file_name
    }

    /// 根据扩展名推断 MIME 类型
    pub fn mime_type(&self) -> &'static str {
        let ext = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());
        match ext.as_deref() {
            Some("png") => "image/png",
            _ => "image/jpeg",
        }
    }
}

impl Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.file_name)
    }
}

/// 一个组及其下的全部图片（已排序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkGroup {
    pub name: String,
    pub items: Vec<WorkItem>,
}

impl WorkGroup {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        let png = WorkItem::new("A", "x.PNG", PathBuf::from("/c/A/x.PNG"));
        let jpg = WorkItem::new("A", "y.jpg", PathBuf::from("/c/A/y.jpg"));
        let jpeg = WorkItem::new("A", "z.jpeg", PathBuf::from("/c/A/z.jpeg"));

        assert_eq!(png.mime_type(), "image/png");
        assert_eq!(jpg.mime_type(), "image/jpeg");
        assert_eq!(jpeg.mime_type(), "image/jpeg");
        assert_eq!(jpg.to_string(), "A/y.jpg");
    }
}
