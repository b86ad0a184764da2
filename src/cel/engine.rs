//! CEL expression engine with compiled program caching

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, Program};
use dashmap::DashMap;
use std::sync::Arc;

use crate::cel::{
    context::EvalContext,
    convert::{cel_to_json, json_to_cel},
    error::{CelError, Result},
    functions,
};

/// Compiles and evaluates boolean expressions over the request environment
///
/// Compiled programs are cached by exact source text; the cache is safe for
/// concurrent readers and writers. The three host functions (`hasRole`,
/// `isOwner`, `inList`) are registered into every evaluation context.
pub struct CelEngine {
    /// Compiled program cache, keyed by source text
    program_cache: Arc<DashMap<String, Arc<Program>>>,
}

impl CelEngine {
    /// Create a new expression engine
    pub fn new() -> Self {
        Self {
            program_cache: Arc::new(DashMap::new()),
        }
    }

    /// Compile an expression, returning the cached program when available
    ///
    /// # Errors
    ///
    /// Returns `CelError::CompilationError` when the source is ill-formed.
    pub fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(prog) = self.program_cache.get(expr) {
            return Ok(prog.clone());
        }

        let program = Program::compile(expr)
            .map_err(|e| CelError::CompilationError(format!("{:?}", e)))?;

        let arc_program = Arc::new(program);
        self.program_cache
            .insert(expr.to_string(), arc_program.clone());

        Ok(arc_program)
    }

    /// Evaluate a compiled program against an environment
    ///
    /// # Errors
    ///
    /// Returns `CelError::EvaluationError` if the program raises, or
    /// `CelError::NonBooleanResult` if it evaluates to a non-boolean.
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext) -> Result<bool> {
        let mut cel_context = Context::default();

        for (key, value) in ctx.to_variables() {
            let cel_value = json_to_cel(&value);
            let _ = cel_context.add_variable(key, cel_value);
        }

        Self::register_functions(&mut cel_context);

        let result = program
            .execute(&cel_context)
            .map_err(|e| CelError::EvaluationError(format!("{:?}", e)))?;

        Self::to_bool(&result)
    }

    /// Compile and evaluate an expression in one call
    pub fn evaluate_expression(&self, expr: &str, ctx: &EvalContext) -> Result<bool> {
        let program = self.compile(expr)?;
        self.evaluate(&program, ctx)
    }

    /// Clear the compiled program cache
    pub fn clear_cache(&self) {
        self.program_cache.clear();
    }

    /// Program cache statistics
    pub fn cache_stats(&self) -> ProgramCacheStats {
        ProgramCacheStats {
            size: self.program_cache.len(),
        }
    }

    /// Register the host functions into an evaluation context
    fn register_functions(context: &mut Context) {
        context.add_function("hasRole", |principal: CelValue, role: CelValue| -> bool {
            functions::has_role(&cel_to_json(&principal), &cel_to_json(&role))
        });
        context.add_function("isOwner", |principal: CelValue, resource: CelValue| -> bool {
            functions::is_owner(&cel_to_json(&principal), &cel_to_json(&resource))
        });
        context.add_function("inList", |value: CelValue, list: CelValue| -> bool {
            functions::in_list(&cel_to_json(&value), &cel_to_json(&list))
        });
    }

    fn to_bool(value: &CelValue) -> Result<bool> {
        match value {
            CelValue::Bool(b) => Ok(*b),
            _ => Err(CelError::NonBooleanResult),
        }
    }
}

impl Default for CelEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Program cache statistics
#[derive(Debug, Clone)]
pub struct ProgramCacheStats {
    /// Number of cached programs
    pub size: usize,
}

// Compiled programs are immutable once built and only ever shared behind
// Arc through the thread-safe DashMap.
unsafe impl Send for CelEngine {}
unsafe impl Sync for CelEngine {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn create_test_context() -> EvalContext {
        let mut principal = HashMap::new();
        principal.insert("id".to_string(), json!("user123"));
        principal.insert("roles".to_string(), json!(["admin", "editor"]));

        let mut resource = HashMap::new();
        resource.insert("kind".to_string(), json!("document"));
        resource.insert("id".to_string(), json!("doc123"));
        resource.insert("attributes".to_string(), json!({"ownerId": "user123"}));

        EvalContext::new()
            .with_principal(principal)
            .with_resource(resource)
    }

    #[test]
    fn test_simple_expressions() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine.evaluate_expression("true", &ctx).unwrap());
        assert!(!engine.evaluate_expression("false", &ctx).unwrap());
    }

    #[test]
    fn test_variable_access() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_expression("principal.id == 'user123'", &ctx)
            .unwrap());
        assert!(engine.evaluate_expression("P.id == 'user123'", &ctx).unwrap());
        assert!(engine
            .evaluate_expression("R.kind == 'document'", &ctx)
            .unwrap());
    }

    #[test]
    fn test_role_membership() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_expression("'admin' in principal.roles", &ctx)
            .unwrap());
        assert!(!engine
            .evaluate_expression("'viewer' in principal.roles", &ctx)
            .unwrap());
    }

    #[test]
    fn test_has_role_function() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_expression("hasRole(principal, 'admin')", &ctx)
            .unwrap());
        assert!(!engine
            .evaluate_expression("hasRole(P, 'viewer')", &ctx)
            .unwrap());
    }

    #[test]
    fn test_is_owner_function() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine.evaluate_expression("isOwner(P, R)", &ctx).unwrap());
        assert!(engine
            .evaluate_expression("isOwner(principal, resource)", &ctx)
            .unwrap());
    }

    #[test]
    fn test_in_list_function() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_expression("inList('read', ['read', 'write'])", &ctx)
            .unwrap());
        assert!(!engine
            .evaluate_expression("inList('delete', ['read', 'write'])", &ctx)
            .unwrap());
    }

    #[test]
    fn test_owner_comparison() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        assert!(engine
            .evaluate_expression("principal.id == resource.attributes.ownerId", &ctx)
            .unwrap());
    }

    #[test]
    fn test_program_caching() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        let _ = engine.evaluate_expression("true", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        let _ = engine.evaluate_expression("true", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        let _ = engine.evaluate_expression("false", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 2);
    }

    #[test]
    fn test_cache_clear() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        let _ = engine.evaluate_expression("true", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        engine.clear_cache();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_compilation_error() {
        let engine = CelEngine::new();
        let result = engine.compile("invalid syntax @#$");
        assert!(matches!(result, Err(CelError::CompilationError(_))));
    }

    #[test]
    fn test_non_boolean_result() {
        let engine = CelEngine::new();
        let ctx = create_test_context();

        let result = engine.evaluate_expression("'hello'", &ctx);
        assert!(matches!(result, Err(CelError::NonBooleanResult)));
    }

    #[test]
    fn test_concurrent_compilation() {
        use std::thread;

        let engine = Arc::new(CelEngine::new());
        let mut handles = vec![];

        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                engine.compile(&format!("1 + {} > 0", i)).is_ok()
            }));
        }

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(engine.cache_stats().size, 8);
    }
}
