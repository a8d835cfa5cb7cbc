//! Name conversions used when deriving relation keys and REST paths from model names.

/// Lowercase the first character: "BlogPost" -> "blogPost".
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Convert a single identifier from PascalCase/camelCase to dashed-case.
/// e.g. "BlogPost" -> "blog-post", "roleMapping" -> "role-mapping"
pub fn to_dashed_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Plural REST segment for a model name: trailing "y" becomes "ie", then dashed-case plus "s".
/// e.g. "Category" -> "categories", "BlogPost" -> "blog-posts"
pub fn pluralize(model_name: &str) -> String {
    let stem = match model_name.strip_suffix('y') {
        Some(head) => format!("{}ie", head),
        None => model_name.to_string(),
    };
    format!("{}s", to_dashed_case(&stem))
}

/// Default foreign key for a model name: "BlogPost" -> "blogPostId".
pub fn foreign_key_for(model_name: &str) -> String {
    format!("{}Id", lower_first(model_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_first_cases() {
        assert_eq!(lower_first("User"), "user");
        assert_eq!(lower_first("BlogPost"), "blogPost");
        assert_eq!(lower_first(""), "");
        assert_eq!(lower_first("x"), "x");
    }

    #[test]
    fn dashed_case() {
        assert_eq!(to_dashed_case("BlogPost"), "blog-post");
        assert_eq!(to_dashed_case("roleMapping"), "role-mapping");
        assert_eq!(to_dashed_case("note"), "note");
    }

    #[test]
    fn plural_rule() {
        assert_eq!(pluralize("Category"), "categories");
        assert_eq!(pluralize("BlogPost"), "blog-posts");
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("RoleMapping"), "role-mappings");
    }

    #[test]
    fn foreign_keys() {
        assert_eq!(foreign_key_for("Account"), "accountId");
        assert_eq!(foreign_key_for("user"), "userId");
    }
}
