#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::component::Resolver;
    use crate::dialect::Dialect;
    use crate::discovery::ComponentRegistry;
    use crate::error::{E_COMPONENT_CYCLE, E_ORPHAN_COMPOUND, E_UNRESOLVED_COMPONENT};
    use crate::node::{ComponentTree, Marker, NodeKind};
    use crate::parse::parse_component;
    use crate::render::Renderer;

    fn registry(components: &[(&str, &str)]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for (name, source) in components {
            let tree = parse_component(source, &format!("components/{}.cmp", name)).unwrap();
            registry.insert(name, tree);
        }
        registry
    }

    fn view(source: &str) -> ComponentTree {
        parse_component(source, "views/index.cmp").unwrap()
    }

    fn includes(tree: &ComponentTree) -> Vec<String> {
        tree.walk()
            .into_iter()
            .filter_map(|id| match tree.kind(id) {
                NodeKind::Marker(Marker::Include { template, .. }) => Some(template.clone()),
                _ => None,
            })
            .collect()
    }

    fn has_components(tree: &ComponentTree) -> bool {
        tree.walk()
            .into_iter()
            .any(|id| matches!(tree.kind(id), NodeKind::Component { .. }))
    }

    #[test]
    fn test_inline_substitutes_props_and_fills_default_slot() {
        let components = registry(&[(
            "Card",
            r#"<div class="card"><h2><Var path="props.title" /></h2><Slot /></div>"#,
        )]);
        let tree = view(r#"<Card title="Hi"><p>Body</p></Card>"#);

        let resolved = Resolver::inline(&components).resolve(&tree).unwrap();
        assert!(!has_components(&resolved.tree));
        assert!(resolved.partials.is_empty());

        let layouts = ComponentRegistry::new();
        let html = Renderer::new(&components, &layouts, "$")
            .render(&tree, &json!({}))
            .unwrap();
        assert_eq!(html, r#"<div class="card"><h2>Hi</h2><p>Body</p></div>"#);
    }

    #[test]
    fn test_named_slots_from_compound_children() {
        let components = registry(&[(
            "Panel",
            r#"<section><header><Slot name="header">Untitled</Slot></header><Slot /></section>"#,
        )]);
        let layouts = ComponentRegistry::new();
        let renderer = Renderer::new(&components, &layouts, "$");

        let filled = view(r#"<Panel><Panel.Header><b>News</b></Panel.Header>text</Panel>"#);
        assert_eq!(
            renderer.render(&filled, &json!({})).unwrap(),
            "<section><header><b>News</b></header>text</section>"
        );

        let fallback = view(r#"<Panel>text</Panel>"#);
        assert_eq!(
            renderer.render(&fallback, &json!({})).unwrap(),
            "<section><header>Untitled</header>text</section>"
        );
    }

    #[test]
    fn test_partial_or_inline_per_dialect() {
        let components = registry(&[("Badge", r#"<span><Var path="props.label" /></span>"#)]);

        // No props, no slot content: a partial everywhere
        let bare = view("<Badge />");
        for dialect in Dialect::ALL {
            let resolved = Resolver::new(&components, Some(dialect), false)
                .resolve(&bare)
                .unwrap();
            assert_eq!(includes(&resolved.tree), vec!["Badge"], "{}", dialect);
        }

        // Props: Mustache partials cannot take arguments
        let with_props = view(r#"<Badge label={user.role} />"#);
        let mustache = Resolver::new(&components, Some(Dialect::Mustache), false)
            .resolve(&with_props)
            .unwrap();
        assert!(includes(&mustache.tree).is_empty());
        assert!(mustache.partials.is_empty());
        for dialect in [Dialect::Jinja, Dialect::Handlebars] {
            let resolved = Resolver::new(&components, Some(dialect), false)
                .resolve(&with_props)
                .unwrap();
            assert_eq!(includes(&resolved.tree), vec!["Badge"]);
            assert!(resolved.partials.contains("Badge"));
        }

        // Slot content is always inlined
        let with_children = view("<Badge><i>x</i></Badge>");
        let resolved = Resolver::new(&components, Some(Dialect::Jinja), false)
            .resolve(&with_children)
            .unwrap();
        assert!(includes(&resolved.tree).is_empty());

        // Forced inlining
        let resolved = Resolver::new(&components, Some(Dialect::Jinja), true)
            .resolve(&bare)
            .unwrap();
        assert!(includes(&resolved.tree).is_empty());
        assert!(!has_components(&resolved.tree));
    }

    #[test]
    fn test_component_cycle_is_reported() {
        let components = registry(&[("A", "<div><B /></div>"), ("B", "<p><A /></p>")]);
        let err = Resolver::inline(&components)
            .resolve(&view("<A />"))
            .unwrap_err();

        assert_eq!(err.code, E_COMPONENT_CYCLE);
        assert!(err.message.contains("A -> B -> A"), "{}", err.message);
        assert_eq!(err.file, "components/B.cmp");
    }

    #[test]
    fn test_unresolved_reference_lists_known_components() {
        let components = registry(&[("Button", "<button><Slot /></button>")]);
        let err = Resolver::inline(&components)
            .resolve(&view("<main><Missing /></main>"))
            .unwrap_err();

        assert_eq!(err.code, E_UNRESOLVED_COMPONENT);
        assert_eq!(err.file, "views/index.cmp");
        assert_eq!(err.node_path.as_deref(), Some("main[0]/Missing[0]"));
        assert_eq!(err.hints, vec!["registered components: Button".to_string()]);
    }

    #[test]
    fn test_compound_part_outside_parent() {
        let components = registry(&[("Card", "<div><Slot /></div>")]);
        let err = Resolver::inline(&components)
            .resolve(&view("<Card.Header>x</Card.Header>"))
            .unwrap_err();
        assert_eq!(err.code, E_ORPHAN_COMPOUND);
    }
}
