//! test262 front matter: the YAML block between `/*---` and `---*/`.

use crate::model::TestMetadata;
use anyhow::Context;

const OPEN: &str = "/*---";
const CLOSE: &str = "---*/";

/// Text of the front-matter block, without the delimiter lines.
///
/// Delimiters are matched on whole trimmed lines. An unterminated block runs to the end of
/// the file.
pub fn front_matter(source: &str) -> Option<String> {
    let mut lines = source.lines();
    lines.by_ref().find(|l| l.trim() == OPEN)?;

    let block: Vec<&str> = lines.take_while(|l| l.trim() != CLOSE).collect();
    Some(block.join("\n"))
}

/// Decode the front matter of a test file. `Ok(None)` when there is no block or it is empty.
pub fn parse(source: &str) -> anyhow::Result<Option<TestMetadata>> {
    let Some(block) = front_matter(source) else {
        return Ok(None);
    };
    if block.trim().is_empty() {
        return Ok(None);
    }

    let mut value: serde_yaml::Value =
        serde_yaml::from_str(&block).context("front matter is not valid YAML")?;
    if value.is_null() {
        return Ok(None);
    }
    normalize_es6id(&mut value);

    let md: TestMetadata =
        serde_yaml::from_value(value).context("front matter has an unexpected shape")?;
    Ok(Some(md))
}

// Section numbers like `es6id: 12.2.6` decode as floats (or fail to), keep them textual.
fn normalize_es6id(value: &mut serde_yaml::Value) {
    let Some(map) = value.as_mapping_mut() else {
        return;
    };
    if let Some(v) = map.get_mut("es6id") {
        let text = match v {
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        };
        if let Some(text) = text {
            *v = serde_yaml::Value::String(text);
        }
    }
}
