use std::collections::HashSet;
use std::fmt;

use swc_core::{
    common::{SyntaxContext, DUMMY_SP},
    ecma::{
        ast::*,
        visit::{VisitMut, VisitMutWith},
    },
};

use crate::config::CustomLayerConfig;

const PROVIDERS: &str = "providers";

// -----------------------------------------------------------------------------
// Diagnostics
// -----------------------------------------------------------------------------

/// One implementation class swapped for its custom layer replacement.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Substitution {
    pub file: String,
    pub original: String,
    pub replacement: String,
    pub module_path: String,
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Applying custom layer on file {} replace {} -> {}",
            self.file, self.original, self.replacement
        )
    }
}

pub struct RewriteOutcome {
    pub program: Program,
    pub substitutions: Vec<Substitution>,
}

/// Rewrites one file. Nothing but `config` outlives the call.
pub fn rewrite_program(
    mut program: Program,
    config: &CustomLayerConfig,
    file_name: &str,
) -> RewriteOutcome {
    let mut transform = CustomLayerTransform::new(config, file_name);
    program.visit_mut_with(&mut transform);
    RewriteOutcome {
        program,
        substitutions: transform.substitutions,
    }
}

// -----------------------------------------------------------------------------
// Transform state
// -----------------------------------------------------------------------------

pub struct CustomLayerTransform<'a> {
    config: &'a CustomLayerConfig,
    file_name: String,

    // Per-file accumulators, drained by `visit_mut_module`.
    pending_imports: Vec<ModuleItem>,
    queued: HashSet<(String, String)>,
    substitutions: Vec<Substitution>,
}

impl<'a> CustomLayerTransform<'a> {
    pub fn new(config: &'a CustomLayerConfig, file_name: impl Into<String>) -> Self {
        Self {
            config,
            file_name: file_name.into(),
            pending_imports: vec![],
            queued: HashSet::new(),
            substitutions: vec![],
        }
    }

    // ---------- decorators ----------

    fn rewrite_class(&mut self, class: &mut Class) {
        for decorator in &mut class.decorators {
            self.rewrite_decorator(decorator);
        }
    }

    /// `@Component({ ..., providers: [...] })` -> same decorator with the
    /// providers normalized and moved to the end of the metadata.
    fn rewrite_decorator(&mut self, decorator: &mut Decorator) {
        let Expr::Call(call) = &mut *decorator.expr else {
            return;
        };
        if !self.is_recognized_callee(&call.callee) {
            return;
        }

        // Metadata must be a single object literal.
        let arg_count = call.args.len();
        let [argument] = call.args.as_mut_slice() else {
            tracing::debug!(
                target: "custom_layer",
                file = %self.file_name,
                args = arg_count,
                "skipping decorator without a single metadata argument"
            );
            return;
        };
        if argument.spread.is_some() {
            return;
        }
        let Expr::Object(metadata) = &mut *argument.expr else {
            tracing::debug!(
                target: "custom_layer",
                file = %self.file_name,
                "skipping decorator whose metadata is not an object literal"
            );
            return;
        };

        self.rewrite_metadata(metadata);
    }

    fn is_recognized_callee(&self, callee: &Callee) -> bool {
        match callee {
            Callee::Expr(expr) => match &**expr {
                Expr::Ident(ident) => self.config.is_recognized_decorator(ident.sym.as_ref()),
                _ => false,
            },
            _ => false,
        }
    }

    fn rewrite_metadata(&mut self, metadata: &mut ObjectLit) {
        if !metadata.props.iter().any(is_providers_array) {
            return;
        }

        let mut providers: Vec<Option<ExprOrSpread>> = vec![];
        let mut retained = Vec::with_capacity(metadata.props.len());
        for mut prop in std::mem::take(&mut metadata.props) {
            if let Some(array) = providers_array_mut(&mut prop) {
                for element in std::mem::take(&mut array.elems) {
                    providers.push(element.map(|entry| self.normalize_provider(entry)));
                }
                continue;
            }
            retained.push(prop);
        }

        // `providers: []` is dropped rather than re-emitted empty.
        if !providers.is_empty() {
            retained.push(key_value(
                PROVIDERS,
                Expr::Array(ArrayLit {
                    span: DUMMY_SP,
                    elems: providers,
                }),
            ));
        }
        metadata.props = retained;
    }

    // ---------- provider entries ----------

    /// `Service` -> `{ provide: Service, useClass: Replacement }`
    /// `{ provide: Token, useClass: Service }` -> `{ provide: Token, useClass: Replacement }`
    fn normalize_provider(&mut self, mut entry: ExprOrSpread) -> ExprOrSpread {
        if entry.spread.is_some() {
            return entry;
        }
        match &mut *entry.expr {
            Expr::Ident(token) => {
                let token = token.clone();
                let implementation = self.lookup_replacement(&token);
                entry.expr = Box::new(self.binding_object(token, implementation));
            }
            Expr::Object(provider) => self.rewrite_object_provider(provider),
            _ => {}
        }
        entry
    }

    fn rewrite_object_provider(&mut self, provider: &mut ObjectLit) {
        let config = self.config;
        if !provider.props.iter().any(|p| prop_is(p, &config.bind_key)) {
            return;
        }
        for prop in &mut provider.props {
            let PropOrSpread::Prop(prop) = prop else {
                continue;
            };
            let Prop::KeyValue(kv) = &mut **prop else {
                continue;
            };
            if !prop_name_is(&kv.key, &config.implement_key) {
                continue;
            }
            if let Expr::Ident(class) = &*kv.value {
                let replacement = self.lookup_replacement(class);
                kv.value = Box::new(Expr::Ident(replacement));
            }
            return;
        }
    }

    fn binding_object(&self, token: Ident, implementation: Ident) -> Expr {
        Expr::Object(ObjectLit {
            span: DUMMY_SP,
            props: vec![
                key_value(&self.config.bind_key, Expr::Ident(token)),
                key_value(&self.config.implement_key, Expr::Ident(implementation)),
            ],
        })
    }

    // ---------- replacement lookup & imports ----------

    /// Replacement identifier for `class`, or `class` itself when the table has
    /// no entry. A hit queues the import the replacement needs.
    fn lookup_replacement(&mut self, class: &Ident) -> Ident {
        let config = self.config;
        let Some(spec) = config.table.get(class.sym.as_ref()) else {
            return class.clone();
        };

        let replacement = Ident::new(
            spec.replacement_class.clone().into(),
            DUMMY_SP,
            SyntaxContext::empty(),
        );
        self.queue_import(&spec.replacement_class, &spec.module_path);

        let substitution = Substitution {
            file: self.file_name.clone(),
            original: class.sym.to_string(),
            replacement: spec.replacement_class.clone(),
            module_path: spec.module_path.clone(),
        };
        tracing::info!(
            target: "custom_layer",
            record = %serde_json::to_string(&substitution).unwrap_or_default(),
            "{substitution}"
        );
        self.substitutions.push(substitution);

        replacement
    }

    fn queue_import(&mut self, class_name: &str, module_path: &str) {
        if self.config.dedupe_imports
            && !self
                .queued
                .insert((class_name.to_string(), module_path.to_string()))
        {
            return;
        }
        self.pending_imports.push(named_import(class_name, module_path));
    }
}

// -----------------------------------------------------------------------------
// AST helpers
// -----------------------------------------------------------------------------

fn prop_name_is(key: &PropName, name: &str) -> bool {
    match key {
        PropName::Ident(ident) => ident.sym.as_ref() == name,
        PropName::Str(s) => s.value.as_ref() == name,
        _ => false,
    }
}

fn prop_is(prop: &PropOrSpread, name: &str) -> bool {
    match prop {
        PropOrSpread::Prop(prop) => match &**prop {
            Prop::KeyValue(kv) => prop_name_is(&kv.key, name),
            Prop::Shorthand(ident) => ident.sym.as_ref() == name,
            _ => false,
        },
        PropOrSpread::Spread(_) => false,
    }
}

fn is_providers_array(prop: &PropOrSpread) -> bool {
    match prop {
        PropOrSpread::Prop(prop) => match &**prop {
            Prop::KeyValue(kv) => {
                prop_name_is(&kv.key, PROVIDERS) && matches!(&*kv.value, Expr::Array(_))
            }
            _ => false,
        },
        PropOrSpread::Spread(_) => false,
    }
}

fn providers_array_mut(prop: &mut PropOrSpread) -> Option<&mut ArrayLit> {
    let PropOrSpread::Prop(prop) = prop else {
        return None;
    };
    let Prop::KeyValue(kv) = &mut **prop else {
        return None;
    };
    if !prop_name_is(&kv.key, PROVIDERS) {
        return None;
    }
    match &mut *kv.value {
        Expr::Array(array) => Some(array),
        _ => None,
    }
}

fn key_value(key: &str, value: Expr) -> PropOrSpread {
    PropOrSpread::Prop(Box::new(Prop::KeyValue(KeyValueProp {
        key: PropName::Ident(IdentName::new(key.into(), DUMMY_SP)),
        value: Box::new(value),
    })))
}

// import { ClassName } from "module_path";
fn named_import(class_name: &str, module_path: &str) -> ModuleItem {
    ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
        span: DUMMY_SP,
        specifiers: vec![ImportSpecifier::Named(ImportNamedSpecifier {
            span: DUMMY_SP,
            local: Ident::new(class_name.into(), DUMMY_SP, SyntaxContext::empty()),
            imported: None,
            is_type_only: false,
        })],
        src: Box::new(Str {
            span: DUMMY_SP,
            value: module_path.into(),
            raw: None,
        }),
        type_only: false,
        with: None,
        phase: ImportPhase::Evaluation,
    }))
}

// -----------------------------------------------------------------------------
// Walk
// -----------------------------------------------------------------------------

impl VisitMut for CustomLayerTransform<'_> {
    fn visit_mut_module(&mut self, m: &mut Module) {
        m.visit_mut_children_with(self);
        if self.pending_imports.is_empty() {
            return;
        }
        let imports = std::mem::take(&mut self.pending_imports);
        m.body.splice(0..0, imports);
    }

    // A script that needs imports is promoted to a module so they can be prepended.
    fn visit_mut_program(&mut self, n: &mut Program) {
        let script = match &mut *n {
            Program::Module(m) => return m.visit_mut_with(self),
            Program::Script(script) => script,
        };
        script.visit_mut_children_with(self);
        if self.pending_imports.is_empty() {
            return;
        }

        let script = std::mem::replace(
            script,
            Script {
                span: DUMMY_SP,
                body: vec![],
                shebang: None,
            },
        );
        let mut body = std::mem::take(&mut self.pending_imports);
        body.extend(script.body.into_iter().map(ModuleItem::Stmt));
        tracing::debug!(
            target: "custom_layer",
            file = %self.file_name,
            "promoting script to module for custom layer imports"
        );
        *n = Program::Module(Module {
            span: script.span,
            body,
            shebang: script.shebang,
        });
    }

    // Only the decorators are rewritten; the class body is left as is.
    fn visit_mut_class_decl(&mut self, n: &mut ClassDecl) {
        self.rewrite_class(&mut n.class);
    }

    fn visit_mut_default_decl(&mut self, n: &mut DefaultDecl) {
        if let DefaultDecl::Class(class) = &mut *n {
            self.rewrite_class(&mut class.class);
            return;
        }
        n.visit_mut_children_with(self);
    }
}
