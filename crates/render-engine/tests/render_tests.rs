//! End-to-end template evaluation tests

use render_core::{TemplateContext, Values};
use render_engine::{Engine, EngineError, TemplateError, TemplateErrorKind};

fn context(config: &str, vars: &[&str]) -> TemplateContext {
    let config = Values::from_yaml(config).expect("valid config");
    TemplateContext::build(config, vars).expect("valid context")
}

fn strict(source: &str, ctx: &TemplateContext) -> Result<String, EngineError> {
    Engine::new(true).render_string(source, ctx, "stdin")
}

fn lenient(source: &str, ctx: &TemplateContext) -> Result<String, EngineError> {
    Engine::new(false).render_string(source, ctx, "stdin")
}

fn template_error(err: EngineError) -> TemplateError {
    match err {
        EngineError::Template(e) => e,
        other => panic!("expected template error, got {other}"),
    }
}

mod context_merging {
    use super::*;

    #[test]
    fn test_variables_override_config() {
        let ctx = context("app:\n  name: web\n  port: 80\n", &["app.name=api"]);
        let out = strict("{{ .app.name }}:{{ .app.port }}", &ctx).unwrap();
        assert_eq!(out, "api:80");
    }

    #[test]
    fn test_later_variables_win() {
        let ctx = context("", &["key=one", "key=two"]);
        assert_eq!(strict("{{ .key }}", &ctx).unwrap(), "two");
    }

    #[test]
    fn test_quoted_variable_value() {
        let ctx = context("", &[r#"msg="hello world""#]);
        assert_eq!(strict("{{ .msg }}", &ctx).unwrap(), "hello world");
    }

    #[test]
    fn test_variable_through_scalar_is_conflict() {
        let config = Values::from_yaml("a: 1\n").unwrap();
        assert!(TemplateContext::build(config, &["a.b=2"]).is_err());
    }
}

mod missing_keys {
    use super::*;

    #[test]
    fn test_strict_reports_location() {
        let err = template_error(strict("{{ .missing }}", &context("", &[])).unwrap_err());

        assert_eq!(err.kind(), TemplateErrorKind::MissingKey);
        let message = err.to_string();
        assert!(message.contains("stdin:1:3"), "{message}");
        assert!(message.contains(r#"map has no entry for key "missing""#), "{message}");
    }

    #[test]
    fn test_strict_location_on_later_line() {
        let source = "a: 1\nb: {{ .x.y }}\n";
        let err = template_error(strict(source, &context("x: {}\n", &[])).unwrap_err());
        assert_eq!(err.location.line, 2);
        assert_eq!(err.location.column, 6);
    }

    #[test]
    fn test_strict_location_points_at_second_operand() {
        let ctx = context("a: x\n", &[]);
        let err = template_error(strict(r#"{{ printf "%s %s" .a .missing }}"#, &ctx).unwrap_err());
        assert_eq!(err.location.to_string(), "stdin:1:21");
    }

    #[test]
    fn test_strict_suggests_near_key() {
        let ctx = context("image: nginx\n", &[]);
        let err = template_error(strict("{{ .imag }}", &ctx).unwrap_err());
        assert!(err.suggestion.unwrap().contains("`image`"));
    }

    #[test]
    fn test_lenient_prints_no_value() {
        let out = lenient("key: {{ .missing }}", &context("", &[])).unwrap();
        assert_eq!(out, "key: <no value>");
    }

    #[test]
    fn test_lenient_missing_nested_condition() {
        // Conditions on absent nested keys are simply false
        let source = "a{{- if .resourceQuota.hard.cpu }}\ncpu: {{ .resourceQuota.hard.cpu }}{{- end }}\n";
        let out = lenient(source, &context("", &[])).unwrap();
        assert_eq!(out, "a\n");
    }

    #[test]
    fn test_default_covers_missing_in_lenient_mode() {
        let out = lenient(r#"{{ .port | default 8080 }}"#, &context("", &[])).unwrap();
        assert_eq!(out, "8080");
    }
}

mod nested_render {
    use super::*;

    #[test]
    fn test_render_with_override() {
        let ctx = context("inner: \"{{ .x }}\"\noverride:\n  x: other\n", &[]);
        let out = strict("key: {{ .inner | render .override }}", &ctx).unwrap();
        assert_eq!(out, "key: other");
    }

    #[test]
    fn test_render_sees_parent_context() {
        let ctx = context("name: web\ntpl: \"svc-{{ .name }}\"\n", &[]);
        assert_eq!(strict("{{ render .tpl }}", &ctx).unwrap(), "svc-web");
    }

    #[test]
    fn test_override_does_not_leak_to_parent() {
        let ctx = context("x: outer\ntpl: \"{{ .x }}\"\n", &[]);
        let out = strict(r#"{{ render (dict "x" "inner") .tpl }} {{ .x }}"#, &ctx).unwrap();
        assert_eq!(out, "inner outer");
    }

    #[test]
    fn test_render_literal_string() {
        let ctx = context("who: world\n", &[]);
        assert_eq!(strict(r#"{{ render "hi {{ .who }}" }}"#, &ctx).unwrap(), "hi world");
    }

    #[test]
    fn test_nested_fault_keeps_inner_location() {
        let ctx = context("tpl: \"{{ .absent }}\"\n", &[]);
        let err = template_error(strict("{{ render .tpl }}", &ctx).unwrap_err());

        assert_eq!(err.kind(), TemplateErrorKind::NestedRender);
        assert!(err.to_string().contains("error calling render"));
        let root = err.root_cause();
        assert_eq!(root.kind(), TemplateErrorKind::MissingKey);
        assert_eq!(root.location.label, "stdin/render");
    }

    #[test]
    fn test_self_render_hits_limit() {
        let ctx = context("loop: \"{{ render .loop }}\"\n", &[]);
        let engine = Engine::builder().max_render_depth(8).build();
        let err = template_error(engine.render_string("{{ render .loop }}", &ctx, "stdin").unwrap_err());
        assert_eq!(err.root_cause().kind(), TemplateErrorKind::RecursionLimit);
    }
}

mod actions {
    use super::*;

    #[test]
    fn test_empty_template() {
        assert_eq!(strict("", &context("", &[])).unwrap(), "");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let source = "no actions here\n{% not jinja %}\n";
        assert_eq!(strict(source, &context("", &[])).unwrap(), source);
    }

    #[test]
    fn test_trim_markers() {
        let source = "items:\n  {{- range .items }}\n  - {{ . }}\n  {{- end }}\n";
        let ctx = context("items: [a, b]\n", &[]);
        assert_eq!(strict(source, &ctx).unwrap(), "items:\n  - a\n  - b\n");
    }

    #[test]
    fn test_range_map_in_key_order() {
        let ctx = context("labels:\n  tier: web\n  app: demo\n", &[]);
        let out = strict("{{ range $k, $v := .labels }}{{ $k }}={{ $v }} {{ end }}", &ctx).unwrap();
        assert_eq!(out, "app=demo tier=web ");
    }

    #[test]
    fn test_range_else() {
        let ctx = context("items: []\n", &[]);
        let out = strict("{{ range .items }}x{{ else }}none{{ end }}", &ctx).unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn test_with_rebinds_dot() {
        let ctx = context("db:\n  host: localhost\nname: app\n", &[]);
        let out = strict("{{ with .db }}{{ .host }}/{{ $.name }}{{ end }}", &ctx).unwrap();
        assert_eq!(out, "localhost/app");
    }

    #[test]
    fn test_define_and_template() {
        let source = r#"{{ define "label" }}app: {{ .name }}{{ end }}{{ template "label" . }}"#;
        let ctx = context("name: web\n", &[]);
        assert_eq!(strict(source, &ctx).unwrap(), "app: web");
    }

    #[test]
    fn test_loop_accumulates_into_outer_variable() {
        let ctx = context("ports: [80, 443]\n", &[]);
        let source = "{{ $last := 0 }}{{ range .ports }}{{ $last = . }}{{ end }}last={{ $last }}";
        assert_eq!(strict(source, &ctx).unwrap(), "last=443");
    }

    #[test]
    fn test_enabled_flag_prints_go_style() {
        let ctx = context("enabled: true\n", &[]);
        assert_eq!(strict("enabled: {{ .enabled }}", &ctx).unwrap(), "enabled: true");
    }

    #[test]
    fn test_comments_are_dropped() {
        let ctx = context("", &[]);
        assert_eq!(strict("a{{/* note */}}b", &ctx).unwrap(), "ab");
    }

    #[test]
    fn test_to_yaml_and_nindent() {
        let ctx = context("res:\n  cpu: 1\n  mem: 2Gi\n", &[]);
        let out = strict("resources:{{ .res | toYaml | nindent 2 }}", &ctx).unwrap();
        assert_eq!(out, "resources:\n  cpu: 1\n  mem: 2Gi");
    }
}

mod compile_errors {
    use super::*;

    #[test]
    fn test_unclosed_action() {
        let err = template_error(strict("{{ .a ", &context("a: 1\n", &[])).unwrap_err());
        assert_eq!(err.kind(), TemplateErrorKind::Syntax);
    }

    #[test]
    fn test_unknown_template() {
        let err = template_error(strict(r#"{{ template "nope" . }}"#, &context("", &[])).unwrap_err());
        assert_eq!(err.kind(), TemplateErrorKind::UnknownTemplate);
    }

    #[test]
    fn test_if_without_condition() {
        let err = template_error(strict("{{ if }}x{{ end }}", &context("", &[])).unwrap_err());
        assert_eq!(err.kind(), TemplateErrorKind::Syntax);
        assert!(err.to_string().ends_with("missing value for if"), "{err}");
    }

    #[test]
    fn test_unknown_function_even_in_lenient_mode() {
        let err = template_error(lenient("{{ uper .a }}", &context("a: 1\n", &[])).unwrap_err());
        assert_eq!(err.kind(), TemplateErrorKind::UnknownFunction);
        assert!(err.suggestion.unwrap().contains("`upper`"));
    }
}
