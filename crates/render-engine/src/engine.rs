//! Template engine: Go templates lowered onto MiniJinja

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use render_core::TemplateContext;

use crate::error::{EngineError, TemplateError};
use crate::lower;
use crate::parser;
use crate::suggestions::is_function;
use crate::{filters, functions};

/// How deep `render` may nest before evaluation is aborted
pub const DEFAULT_MAX_RENDER_DEPTH: usize = 32;

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
    max_render_depth: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict_mode: true,
            max_render_depth: DEFAULT_MAX_RENDER_DEPTH,
        }
    }

    /// Set strict mode (fail on missing keys)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Limit how deeply `render` calls may nest
    pub fn max_render_depth(mut self, depth: usize) -> Self {
        self.max_render_depth = depth;
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine {
            env: create_environment(self.strict_mode, self.max_render_depth),
            strict_mode: self.strict_mode,
        }
    }
}

/// The template engine
///
/// Holds the function table; every render works on its own copy of the
/// environment, so one engine can serve any number of evaluations.
pub struct Engine {
    env: Environment<'static>,
    strict_mode: bool,
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new(strict_mode: bool) -> Self {
        EngineBuilder::new().strict(strict_mode).build()
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Render a single template string
    ///
    /// `label` names the template in error locations (`label:line:col`).
    pub fn render_string(&self, template: &str, context: &TemplateContext, label: &str) -> Result<String, EngineError> {
        tracing::debug!(label, strict = self.strict_mode, "rendering template");
        Ok(evaluate(&self.env, label, template, context, 0)?)
    }
}

/// Create a configured MiniJinja environment
fn create_environment(strict_mode: bool, max_render_depth: usize) -> Environment<'static> {
    let mut env = Environment::new();

    // Configure behavior
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_formatter(functions::go_formatter);
    if strict_mode {
        env.set_undefined_behavior(UndefinedBehavior::Strict);
    } else {
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
    }

    // Accessors used by lowered programs
    env.add_function("__field", functions::field_accessor(strict_mode));
    env.add_function("__range_values", functions::range_values);
    env.add_function("__range_entries", functions::range_entries);
    env.add_function("__operand", functions::operand);

    // Go builtins
    env.add_function("eq", functions::eq);
    env.add_function("ne", functions::ne);
    env.add_function("lt", functions::lt);
    env.add_function("le", functions::le);
    env.add_function("gt", functions::gt);
    env.add_function("ge", functions::ge);
    env.add_function("len", functions::len);
    env.add_function("index", functions::index);
    env.add_function("slice", functions::slice);
    env.add_function("print", functions::print);
    env.add_function("printf", functions::printf);
    env.add_function("println", functions::println);
    env.add_function("html", functions::html);
    env.add_function("js", functions::js);
    env.add_function("urlquery", functions::urlquery);

    // Strings
    env.add_function("upper", filters::upper);
    env.add_function("lower", filters::lower);
    env.add_function("title", filters::title);
    env.add_function("trim", filters::trim);
    env.add_function("trimPrefix", filters::trim_prefix);
    env.add_function("trimSuffix", filters::trim_suffix);
    env.add_function("trunc", filters::trunc);
    env.add_function("quote", filters::quote);
    env.add_function("squote", filters::squote);
    env.add_function("replace", filters::replace);
    env.add_function("contains", filters::contains);
    env.add_function("hasPrefix", filters::has_prefix);
    env.add_function("hasSuffix", filters::has_suffix);
    env.add_function("repeat", filters::repeat);
    env.add_function("split", filters::split);
    env.add_function("join", filters::join);
    env.add_function("indent", filters::indent);
    env.add_function("nindent", filters::nindent);
    env.add_function("snakecase", filters::snakecase);
    env.add_function("kebabcase", filters::kebabcase);
    env.add_function("regexMatch", filters::regex_match);
    env.add_function("regexReplaceAll", filters::regex_replace_all);

    // Encoding
    env.add_function("b64enc", filters::b64enc);
    env.add_function("b64dec", filters::b64dec);
    env.add_function("toYaml", filters::to_yaml);
    env.add_function("fromYaml", filters::from_yaml);
    env.add_function("toJson", filters::to_json_string);
    env.add_function("toPrettyJson", filters::to_pretty_json);
    env.add_function("fromJson", filters::from_json);
    env.add_function("sha256sum", filters::sha256sum);
    env.add_function("sha1sum", filters::sha1sum);

    // Defaults and flow
    env.add_function("default", functions::default);
    env.add_function("required", functions::required);
    env.add_function("empty", functions::empty);
    env.add_function("coalesce", functions::coalesce);
    env.add_function("ternary", functions::ternary);
    env.add_function("fail", functions::fail);

    // Collections
    env.add_function("list", functions::list);
    env.add_function("dict", functions::dict);
    env.add_function("get", functions::get);
    env.add_function("set", functions::set);
    env.add_function("unset", functions::unset);
    env.add_function("hasKey", functions::has_key);
    env.add_function("keys", functions::keys);
    env.add_function("merge", functions::merge);
    env.add_function("dig", functions::dig);
    env.add_function("first", functions::first);
    env.add_function("last", functions::last);

    // Conversion
    env.add_function("toString", functions::to_string);
    env.add_function("toStrings", functions::to_strings);
    env.add_function("atoi", functions::atoi);
    env.add_function("int", functions::int);
    env.add_function("float64", functions::float64);

    // Math
    env.add_function("add", functions::add);
    env.add_function("sub", functions::sub);
    env.add_function("mul", functions::mul);
    env.add_function("div", functions::div);
    env.add_function("mod", functions::modulo);
    env.add_function("max", functions::max);
    env.add_function("min", functions::min);

    // Misc
    env.add_function("now", functions::now);
    env.add_function("semverCompare", functions::semver_compare);
    env.add_function("render", functions::render_function(max_render_depth));

    env
}

/// Parse, lower and run one Go template
///
/// Shared by top-level renders and the `render` function; `depth` counts
/// the enclosing `render` calls.
pub(crate) fn evaluate(
    env: &Environment<'_>,
    label: &str,
    source: &str,
    context: &TemplateContext,
    depth: usize,
) -> Result<String, TemplateError> {
    if source.is_empty() {
        return Ok(String::new());
    }

    let template = parser::parse(source).map_err(|e| TemplateError::from_parse(e, label, source))?;
    let lowered =
        lower::lower(&template, label, &is_function).map_err(|e| TemplateError::from_lowering(e, label, source))?;
    tracing::trace!(label, program = %lowered.main.source, "lowered template");

    let mut env = env.clone();
    for define in lowered.defines.iter().chain(std::iter::once(&lowered.main)) {
        env.add_template_owned(define.name.clone(), define.source.clone())
            .map_err(|e| TemplateError::from_minijinja(&e, label, source, &lowered))?;
    }

    let values = Value::from_serialize(&context.values);
    let ctx = minijinja::context! {
        __dot => values.clone(),
        __root => values.clone(),
        __context => values,
        __depth => depth,
        __label => label,
    };

    let tmpl = env
        .get_template(label)
        .map_err(|e| TemplateError::from_minijinja(&e, label, source, &lowered))?;
    tmpl.render(ctx)
        .map_err(|e| TemplateError::from_minijinja(&e, label, source, &lowered))
}
