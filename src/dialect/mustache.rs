//! Mustache, with the inheritance extension (`{{< parent}}` / `{{$ block}}`).
//!
//! Mustache has no expressions: conditions are sections over a path
//! (`{{#a}}`) or inverted sections (`{{^a}}`), and a loop body sees the
//! current item as the context, so alias paths are rewritten relative to it.
//!
//! A section over a list repeats its body per item, so a condition on a path
//! the template also loops over tests `path.length` instead.

use std::collections::{BTreeMap, BTreeSet};

use super::{block_name, layout_path, partial_path, Branch, Dialect, DialectEmitter, EmitResult, LoopFrame};
use crate::expr::Expr;
use crate::filters::Filter;
use crate::node::escape_text;

#[derive(Debug, Default)]
pub struct MustacheEmitter {
    lists: BTreeSet<Vec<String>>,
}

impl MustacheEmitter {
    fn path(&self, segments: &[String], scope: &[LoopFrame]) -> EmitResult {
        let root = segments[0].as_str();

        if let Some(inner) = scope.last() {
            if inner.alias == root {
                return Ok(if segments.len() == 1 {
                    ".".to_string()
                } else {
                    segments[1..].join(".")
                });
            }
            if inner.key.as_deref() == Some(root) {
                return Err(format!(
                    "Mustache sections expose no loop index; `{}` cannot be referenced",
                    root
                ));
            }
        }

        let outer = scope.iter().rev().skip(1).find(|frame| {
            frame.alias == root || frame.key.as_deref() == Some(root)
        });
        if outer.is_some() {
            return Err(format!(
                "Mustache cannot reach the outer loop variable `{}` from a nested section",
                root
            ));
        }

        Ok(segments.join("."))
    }

    fn expr_path(&self, expr: &Expr, scope: &[LoopFrame]) -> EmitResult {
        match expr {
            Expr::Path(segments) => self.path(segments, scope),
            other => Err(format!(
                "Mustache can only interpolate a plain path, got `{}`",
                other
            )),
        }
    }

    fn condition_path(&self, segments: &[String], scope: &[LoopFrame]) -> EmitResult {
        let path = self.path(segments, scope)?;
        if !self.lists.contains(segments) {
            return Ok(path);
        }
        Ok(if path == "." {
            "length".to_string()
        } else {
            format!("{}.length", path)
        })
    }

    /// `(path, negated)` for a section condition.
    fn section(&self, condition: &Expr, scope: &[LoopFrame]) -> Result<(String, bool), String> {
        match condition {
            Expr::Path(segments) => Ok((self.condition_path(segments, scope)?, false)),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Path(segments) => Ok((self.condition_path(segments, scope)?, true)),
                _ => Err(format!("Mustache conditions must be a path or `!path`, got `{}`", condition)),
            },
            other => Err(format!(
                "Mustache conditions must be a path or `!path`, got `{}`",
                other
            )),
        }
    }

    fn chain(&self, branches: &[Branch], scope: &[LoopFrame]) -> EmitResult {
        let Some((first, rest)) = branches.split_first() else {
            return Ok(String::new());
        };
        let Some(condition) = &first.condition else {
            return Ok(first.body.clone());
        };

        let (path, negated) = self.section(condition, scope)?;
        let (open, inverse) = if negated { ('^', '#') } else { ('#', '^') };

        let mut out = format!("{{{{{}{}}}}}{}{{{{/{}}}}}", open, path, first.body, path);
        if !rest.is_empty() {
            out.push_str(&format!(
                "{{{{{}{}}}}}{}{{{{/{}}}}}",
                inverse,
                path,
                self.chain(rest, scope)?,
                path
            ));
        }
        Ok(out)
    }
}

fn comment(text: &str) -> String {
    format!("{{{{! {} }}}}", text.replace("}}", "} }"))
}

impl DialectEmitter for MustacheEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::Mustache
    }

    fn iterated_paths(&mut self, paths: BTreeSet<Vec<String>>) {
        self.lists = paths;
    }

    fn text(&self, text: &str) -> String {
        if text.contains("{{") || text.contains("}}") {
            format!("{{{{=<% %>=}}}}{}<%={{{{ }}}}=%>", text)
        } else {
            text.to_string()
        }
    }

    fn variable(
        &self,
        expr: &Expr,
        default: Option<&str>,
        filter: Option<Filter>,
        raw: bool,
        scope: &[LoopFrame],
    ) -> EmitResult {
        let path = self.expr_path(expr, scope)?;
        let tag = if raw {
            format!("{{{{{{{}}}}}}}", path)
        } else {
            format!("{{{{{}}}}}", path)
        };
        // Filters are lambdas supplied with the data
        let value = match filter {
            Some(f) => format!("{{{{#{}}}}}{}{{{{/{}}}}}", f.name(), tag, f.name()),
            None => tag,
        };

        Ok(match default {
            Some(fallback) => format!(
                "{{{{#{p}}}}}{}{{{{/{p}}}}}{{{{^{p}}}}}{}{{{{/{p}}}}}",
                value,
                self.text(&escape_text(fallback)),
                p = path
            ),
            None => value,
        })
    }

    fn conditional(&self, branches: &[Branch], scope: &[LoopFrame]) -> EmitResult {
        self.chain(branches, scope)
    }

    fn loop_block(
        &self,
        items: &Expr,
        _frame: &LoopFrame,
        body: &str,
        scope: &[LoopFrame],
    ) -> EmitResult {
        let path = self.expr_path(items, scope)?;
        Ok(format!("{{{{#{p}}}}}{}{{{{/{p}}}}}", body, p = path))
    }

    fn slot(&self, name: &str, default_body: &str) -> String {
        format!("{{{{${n}}}}}{}{{{{/{n}}}}}", default_body, n = block_name(name))
    }

    fn include(
        &self,
        template: &str,
        props: &BTreeMap<String, Expr>,
        _scope: &[LoopFrame],
        warnings: &mut Vec<String>,
    ) -> EmitResult {
        let reference = format!("{{{{> {}}}}}", partial_path(template));
        if props.is_empty() {
            return Ok(reference);
        }

        warnings.push(format!(
            "Mustache partials take no arguments; props of \"{}\" are recorded in a comment",
            template
        ));
        let serialized: BTreeMap<&str, String> = props
            .iter()
            .map(|(name, expr)| (name.as_str(), expr.to_string()))
            .collect();
        let json = serde_json::to_string(&serialized).map_err(|e| e.to_string())?;
        Ok(format!("{}{}", comment(&format!("props: {}", json)), reference))
    }

    fn extends(&self, parent: &str, blocks: &[(String, String)]) -> String {
        let parent = layout_path(parent);
        let mut out = format!("{{{{<{}}}}}", parent);
        for (name, body) in blocks {
            out.push_str(&format!("{{{{${n}}}}}{}{{{{/{n}}}}}", body, n = block_name(name)));
        }
        out.push_str(&format!("{{{{/{}}}}}", parent));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(alias: &str, key: Option<&str>) -> LoopFrame {
        LoopFrame {
            alias: alias.to_string(),
            key: key.map(|k| k.to_string()),
        }
    }

    #[test]
    fn test_alias_paths_are_relative_to_the_section() {
        let emitter = MustacheEmitter::default();
        let scope = vec![frame("item", Some("i"))];

        let out = emitter
            .variable(&Expr::path("item.name"), None, None, false, &scope)
            .unwrap();
        assert_eq!(out, "{{name}}");
        let out = emitter
            .variable(&Expr::path("item"), None, None, true, &scope)
            .unwrap();
        assert_eq!(out, "{{{.}}}");
        assert!(emitter
            .variable(&Expr::path("i"), None, None, false, &scope)
            .is_err());
    }

    #[test]
    fn test_filter_and_default() {
        let emitter = MustacheEmitter::default();
        let out = emitter
            .variable(&Expr::path("price"), Some("n/a"), Some(Filter::Currency), false, &[])
            .unwrap();
        assert_eq!(
            out,
            "{{#price}}{{#currency}}{{price}}{{/currency}}{{/price}}{{^price}}n/a{{/price}}"
        );
    }

    #[test]
    fn test_negated_chain() {
        let emitter = MustacheEmitter::default();
        let branches = vec![
            Branch {
                condition: Some(Expr::parse("!empty").unwrap()),
                body: "A".to_string(),
            },
            Branch {
                condition: None,
                body: "B".to_string(),
            },
        ];
        assert_eq!(
            emitter.conditional(&branches, &[]).unwrap(),
            "{{^empty}}A{{/empty}}{{#empty}}B{{/empty}}"
        );

        let compare = vec![Branch {
            condition: Some(Expr::parse("a == 1").unwrap()),
            body: "A".to_string(),
        }];
        assert!(emitter.conditional(&compare, &[]).is_err());
    }

    #[test]
    fn test_text_with_delimiters_switches_tags() {
        let emitter = MustacheEmitter::default();
        assert_eq!(emitter.text("plain"), "plain");
        assert_eq!(emitter.text("a {{b}}"), "{{=<% %>=}}a {{b}}<%={{ }}=%>");
    }

    #[test]
    fn test_list_condition_tests_length() {
        let mut emitter = MustacheEmitter::default();
        emitter.iterated_paths(BTreeSet::from([vec!["items".to_string()]]));
        let branches = vec![
            Branch {
                condition: Some(Expr::path("items")),
                body: "A".to_string(),
            },
            Branch {
                condition: None,
                body: "B".to_string(),
            },
        ];
        assert_eq!(
            emitter.conditional(&branches, &[]).unwrap(),
            "{{#items.length}}A{{/items.length}}{{^items.length}}B{{/items.length}}"
        );

        let flag = vec![Branch {
            condition: Some(Expr::path("open")),
            body: "A".to_string(),
        }];
        assert_eq!(emitter.conditional(&flag, &[]).unwrap(), "{{#open}}A{{/open}}");
    }
}
