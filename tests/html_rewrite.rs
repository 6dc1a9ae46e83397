//! End-to-end tests for the HTML dialect: markup reconstruction, block
//! operator attributes, bound attributes and text-tag opacity.

use kakikae::{render_html, KakikaeError};
use serde_json::json;

mod markup {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_markup_renders_to_itself() {
        let source = "<!DOCTYPE html>\n<html>\n<body class=\"page\">\n<p>hi</p>\n</body>\n</html>\n";
        assert_eq!(render_html(source, &json!({})).unwrap(), source);
    }

    #[test]
    fn text_and_comment_interpolation() {
        let out = render_html(
            "<!-- built for {{ user }} --><p>Hello {{ user }}</p>",
            &json!({"user": "ada"}),
        )
        .unwrap();
        assert_eq!(out, "<!-- built for ada --><p>Hello ada</p>");
    }

    #[test]
    fn void_and_bare_value_attributes_survive() {
        let source = "<input type=text disabled><br><img src=\"x.png\">";
        assert_eq!(render_html(source, &json!({})).unwrap(), source);
    }

    #[test]
    fn script_bodies_are_opaque() {
        // braces and markup-like text inside a text tag pass through raw
        let source = "<script>if (a < b) { x('</i>'); } var t = '{{ raw }}';</script>";
        assert_eq!(render_html(source, &json!({})).unwrap(), source);
    }
}

mod conditionals {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn if_tag_is_kept_or_dropped_whole() {
        let source = r#"<span v-if="ok">yes</span>"#;
        assert_eq!(
            render_html(source, &json!({"ok": true})).unwrap(),
            "<span>yes</span>"
        );
        assert_eq!(render_html(source, &json!({"ok": false})).unwrap(), "");
    }

    #[test]
    fn else_chain_renders_exactly_one_tag() {
        let source = r#"<span v-if="ok">A</span><span v-else>B</span>"#;
        assert_eq!(
            render_html(source, &json!({"ok": false})).unwrap(),
            "<span>B</span>"
        );
        assert_eq!(
            render_html(source, &json!({"ok": true})).unwrap(),
            "<span>A</span>"
        );
    }

    #[test]
    fn else_if_chain_picks_the_first_truthy_arm() {
        let source = concat!(
            r#"<i v-if="a">first</i>"#,
            r#"<i v-else-if="b">second</i>"#,
            r#"<i v-else>third</i>"#,
        );
        assert_eq!(
            render_html(source, &json!({"a": false, "b": true})).unwrap(),
            "<i>second</i>"
        );
        assert_eq!(
            render_html(source, &json!({"a": false, "b": false})).unwrap(),
            "<i>third</i>"
        );
    }

    #[test]
    fn whitespace_between_chained_tags_is_allowed() {
        let source = "<span v-if=\"ok\">A</span>\n  <span v-else>B</span>";
        let out = render_html(source, &json!({"ok": false})).unwrap();
        assert_eq!(out, "\n  <span>B</span>");
    }

    #[test]
    fn operator_attributes_never_leak_into_output() {
        let out = render_html(
            r#"<div v-if="ok" class="box">x</div>"#,
            &json!({"ok": true}),
        )
        .unwrap();
        assert_eq!(out, r#"<div class="box">x</div>"#);
    }
}

mod loops {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn for_repeats_the_whole_tag() {
        let out = render_html(
            r#"<ul><li v-for="u of users">{{ u }}</li></ul>"#,
            &json!({"users": ["ada", "bob"]}),
        )
        .unwrap();
        assert_eq!(out, "<ul><li>ada</li><li>bob</li></ul>");
    }

    #[test]
    fn for_with_index_binding() {
        let out = render_html(
            r#"<li v-for="u, i of users">{{ i }}-{{ u }}</li>"#,
            &json!({"users": ["a", "b"]}),
        )
        .unwrap();
        assert_eq!(out, "<li>0-a</li><li>1-b</li>");
    }

    #[test]
    fn for_if_pair_filters_iterations() {
        let out = render_html(
            r#"<li v-for="x of xs" v-if="x != 'skip'">{{ x }}</li>"#,
            &json!({"xs": ["a", "skip", "b"]}),
        )
        .unwrap();
        assert_eq!(out, "<li>a</li><li>b</li>");
    }

    #[test]
    fn for_else_pair_loops_only_on_the_else_path() {
        let source = concat!(
            r#"<li v-if="empty">none</li>"#,
            r#"<li v-for="x of xs" v-else>{{ x }}</li>"#,
        );
        assert_eq!(
            render_html(source, &json!({"empty": false, "xs": [1, 2]})).unwrap(),
            "<li>1</li><li>2</li>"
        );
        assert_eq!(
            render_html(source, &json!({"empty": true, "xs": [1, 2]})).unwrap(),
            "<li>none</li>"
        );
    }
}

mod bound_attributes {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boolean_values_keep_attribute_semantics() {
        let source = r#"<button :disabled="busy">go</button>"#;
        assert_eq!(
            render_html(source, &json!({"busy": true})).unwrap(),
            "<button disabled>go</button>"
        );
        assert_eq!(
            render_html(source, &json!({"busy": false})).unwrap(),
            "<button>go</button>"
        );
    }

    #[test]
    fn other_values_render_as_quoted_strings() {
        let out = render_html(
            r#"<div :class="'cell-' + kind" :data-n="n">x</div>"#,
            &json!({"kind": "top", "n": 3}),
        )
        .unwrap();
        assert_eq!(out, r#"<div class="cell-top" data-n="3">x</div>"#);
    }

    #[test]
    fn quotes_in_values_are_escaped_on_emission() {
        let out = render_html(
            r#"<div :title="t">x</div>"#,
            &json!({"t": "say \"hi\""}),
        )
        .unwrap();
        assert_eq!(out, r#"<div title="say &quot;hi&quot;">x</div>"#);
    }
}

mod grammar_errors {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expect_grammar_error(source: &str) -> String {
        let err = render_html(source, &json!({})).unwrap_err();
        assert!(matches!(err, KakikaeError::Grammar(_)), "got {err}");
        err.to_string()
    }

    #[test]
    fn else_without_predecessor() {
        let msg = expect_grammar_error(r#"<span v-else>B</span>"#);
        assert!(msg.contains("Unexpected block operation \"else\"."));
    }

    #[test]
    fn chain_broken_by_interleaved_text() {
        let msg =
            expect_grammar_error(r#"<span v-if="a">A</span>gap<span v-else>B</span>"#);
        assert!(msg.contains("Unexpected block operation \"else\"."));
    }

    #[test]
    fn incompatible_operator_pair() {
        let msg = expect_grammar_error(r#"<li v-if="a" v-else>x</li>"#);
        assert!(msg.contains("is not compatible with"));
    }

    #[test]
    fn more_than_two_operators() {
        let msg = expect_grammar_error(r#"<li v-for="x of xs" v-if="a" v-else>x</li>"#);
        assert!(msg.contains("Too many block operations"));
    }

    #[test]
    fn unknown_operator_name() {
        let msg = expect_grammar_error(r#"<li v-show="a">x</li>"#);
        assert!(msg.contains("Unknown block operation \"show\"."));
    }

    #[test]
    fn operator_expression_rules() {
        let msg = expect_grammar_error(r#"<li v-if>x</li>"#);
        assert!(msg.contains("Expression required for \"if\" operation."));
        let msg =
            expect_grammar_error(r#"<li v-if="a">A</li><li v-else="b">B</li>"#);
        assert!(msg.contains("Unexpected expression for \"else\" operation."));
    }

    #[test]
    fn tag_name_mismatch_names_both_tags() {
        let msg = expect_grammar_error("<div>x</span>");
        assert!(msg.contains("Open tag <div> and closing tag </span> must be equal."));
    }

    #[test]
    fn unclosed_tag_is_reported() {
        let msg = expect_grammar_error("<div><p>deep\n");
        assert!(msg.contains("Missing closing tag for <p>."));
    }

    #[test]
    fn bad_bound_expression_is_a_syntax_error() {
        let err = render_html(r#"<div :class="a ] b">x</div>"#, &json!({})).unwrap_err();
        assert!(matches!(err, KakikaeError::ExpressionSyntax(_)));
    }
}
