//! Small utility helpers used across modules.

/// Replaces every `{key}` in the template with its value. No nesting or escaping.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings, cut on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// `mm:ss` rendering of an attempt duration.
pub fn format_duration_ms(ms: u64) -> String {
  let total_seconds = ms / 1000;
  format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn now_epoch_ms() -> i64 {
  chrono::Utc::now().timestamp_millis()
}
