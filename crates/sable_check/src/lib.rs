use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;
use sable_parser::parse_program;
use sable_syntax::{
    Expr, Function, FunctionKind, Ident, Literal, NodeId, Span, Stmt, TypeNode, UnaryOp,
};

/// A semantic type. Equality and hashing are by identity: two types are the
/// same type only if they are the same allocation, which is what the subtype
/// relation and the generic-resolution table key on.
#[derive(Clone)]
pub struct Type(Rc<TypeObj>);

pub struct TypeObj {
    kind: TypeKind,
}

pub enum TypeKind {
    Simple(ObjectType),
    Functor(FunctorType),
    Union(UnionType),
    Interface(ObjectType),
    Generic(GenericType),
    GenericDef(GenericDef),
}

/// The shared shape of nominal class types and structural interface types:
/// ordered method and field tables, declared generic parameters, and an
/// optional supertype. Tables are populated after allocation so that a class
/// body can refer to its own type.
pub struct ObjectType {
    pub name: RefCell<String>,
    pub methods: RefCell<IndexMap<String, Type>>,
    pub fields: RefCell<IndexMap<String, Type>>,
    pub generics: RefCell<Vec<Type>>,
    pub super_type: RefCell<Option<Type>>,
}

pub struct FunctorType {
    pub args: RefCell<Vec<Option<Type>>>,
    pub return_type: RefCell<Option<Type>>,
    pub generics: RefCell<Vec<Type>>,
}

pub struct UnionType {
    pub left: Type,
    pub right: Type,
}

pub struct GenericType {
    pub target: Type,
    pub args: Vec<Type>,
}

pub struct GenericDef {
    pub name: String,
    pub extends: Option<Type>,
}

impl Type {
    fn new(kind: TypeKind) -> Self {
        Type(Rc::new(TypeObj { kind }))
    }

    pub fn simple(name: &str) -> Self {
        Type::new(TypeKind::Simple(ObjectType::named(name)))
    }

    pub fn interface(name: &str) -> Self {
        Type::new(TypeKind::Interface(ObjectType::named(name)))
    }

    pub fn functor() -> Self {
        Type::new(TypeKind::Functor(FunctorType {
            args: RefCell::new(Vec::new()),
            return_type: RefCell::new(None),
            generics: RefCell::new(Vec::new()),
        }))
    }

    pub fn union(left: Type, right: Type) -> Self {
        Type::new(TypeKind::Union(UnionType { left, right }))
    }

    pub fn generic(target: Type, args: Vec<Type>) -> Self {
        Type::new(TypeKind::Generic(GenericType { target, args }))
    }

    pub fn generic_def(name: &str, extends: Option<Type>) -> Self {
        Type::new(TypeKind::GenericDef(GenericDef {
            name: name.to_string(),
            extends,
        }))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self.kind() {
            TypeKind::Simple(object) | TypeKind::Interface(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_functor(&self) -> Option<&FunctorType> {
        match self.kind() {
            TypeKind::Functor(functor) => Some(functor),
            _ => None,
        }
    }
}

impl ObjectType {
    fn named(name: &str) -> Self {
        ObjectType {
            name: RefCell::new(name.to_string()),
            methods: RefCell::new(IndexMap::new()),
            fields: RefCell::new(IndexMap::new()),
            generics: RefCell::new(Vec::new()),
            super_type: RefCell::new(None),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_type(self))
    }
}

pub fn format_type(ty: &Type) -> String {
    match ty.kind() {
        TypeKind::Simple(object) | TypeKind::Interface(object) => object.name.borrow().clone(),
        TypeKind::Functor(functor) => {
            let args = functor
                .args
                .borrow()
                .iter()
                .map(|arg| match arg {
                    Some(ty) => format_type(ty),
                    None => "_".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let ret = match functor.return_type.borrow().as_ref() {
                Some(ty) => format_type(ty),
                None => "Nil".to_string(),
            };
            format!("({args})=>{ret}")
        }
        TypeKind::Union(union) => {
            format!("{} | {}", format_type(&union.left), format_type(&union.right))
        }
        TypeKind::Generic(generic) => {
            let args = generic
                .args
                .iter()
                .map(format_type)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}<{args}>", format_type(&generic.target))
        }
        TypeKind::GenericDef(def) => def.name.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub message: String,
    pub line: u32,
    pub lexeme: String,
}

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.lexeme.is_empty() {
            write!(f, "[line {}] Error: {}", self.line, self.message)
        } else {
            write!(
                f,
                "[line {}] Error at '{}': {}",
                self.line, self.lexeme, self.message
            )
        }
    }
}

impl std::error::Error for TypeError {}

pub struct Builtins {
    pub number: Type,
    pub nil: Type,
    pub bool_: Type,
    pub atom: Type,
    pub string: Type,
    pub never: Type,
    pub any: Type,
    pub list_def: Type,
    pub map_def: Type,
    pub task_def: Type,
}

impl Builtins {
    fn new() -> Self {
        let any = Type::simple("Any");

        let list_def = Type::simple("List");
        if let Some(object) = list_def.as_object() {
            object
                .generics
                .borrow_mut()
                .push(Type::generic_def("T", None));
            let init = Type::functor();
            *init
                .as_functor()
                .expect("functor type")
                .return_type
                .borrow_mut() = Some(list_def.clone());
            object.methods.borrow_mut().insert("init".to_string(), init);
        }

        let map_def = Type::simple("Map");
        if let Some(object) = map_def.as_object() {
            let mut generics = object.generics.borrow_mut();
            generics.push(Type::generic_def("K", None));
            generics.push(Type::generic_def("V", None));
            drop(generics);
            let init = Type::functor();
            *init
                .as_functor()
                .expect("functor type")
                .return_type
                .borrow_mut() = Some(map_def.clone());
            object.methods.borrow_mut().insert("init".to_string(), init);
        }

        Builtins {
            number: Type::simple("Number"),
            nil: Type::simple("Nil"),
            bool_: Type::simple("Bool"),
            atom: Type::simple("Atom"),
            string: Type::simple("String"),
            never: Type::simple("Never"),
            any,
            list_def,
            map_def,
            task_def: Type::simple("Task"),
        }
    }
}

struct TypeEnv {
    locals: HashMap<String, Type>,
    type_defs: HashMap<String, Type>,
    generic_resolutions: HashMap<Type, Option<Type>>,
    kind: FunctionKind,
}

impl TypeEnv {
    fn new(kind: FunctionKind) -> Self {
        TypeEnv {
            locals: HashMap::new(),
            type_defs: HashMap::new(),
            generic_resolutions: HashMap::new(),
            kind,
        }
    }
}

pub struct Checker {
    envs: Vec<TypeEnv>,
    pub builtins: Builtins,
    modules: HashMap<String, Type>,
    builtin_modules: HashMap<String, Type>,
    node_types: HashMap<NodeId, Type>,
    errors: Vec<TypeError>,
    current_class: Option<Type>,
    current_functor: Option<Type>,
    current_assignment: Option<Type>,
}

pub fn check_program(stmts: &[Stmt]) -> Result<Checker, Vec<TypeError>> {
    let mut checker = Checker::new();
    checker.check(stmts);
    if checker.errors.is_empty() {
        Ok(checker)
    } else {
        Err(checker.errors)
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("envs", &self.envs.len())
            .field("modules", &self.modules.len())
            .field("errors", &self.errors)
            .finish()
    }
}

impl Checker {
    pub fn new() -> Self {
        let mut checker = Checker {
            envs: Vec::new(),
            builtins: Builtins::new(),
            modules: HashMap::new(),
            builtin_modules: HashMap::new(),
            node_types: HashMap::new(),
            errors: Vec::new(),
            current_class: None,
            current_functor: None,
            current_assignment: None,
        };
        checker.push_global_env();
        checker.register_task_module();
        checker
    }

    pub fn check(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.node_types.get(&id)
    }

    pub fn is_subtype(&mut self, sub: &Type, sup: &Type) -> bool {
        if sub == sup {
            return true;
        }
        if *sup == self.builtins.never {
            return false;
        }
        if *sup == self.builtins.any {
            return true;
        }

        match sub.kind() {
            TypeKind::Generic(generic) => {
                let target = generic.target.clone();
                if self.is_subtype(&target, sup) {
                    return true;
                }
            }
            TypeKind::GenericDef(_) => {
                if let Some(inner) = self.find_generic_resolution(sub) {
                    return self.is_subtype(&inner, sup);
                }
            }
            _ => {}
        }

        match sup.kind() {
            TypeKind::Simple(_) => {
                let TypeKind::Simple(sub_object) = sub.kind() else {
                    return false;
                };
                let parent = sub_object.super_type.borrow().clone();
                match parent {
                    Some(parent) => self.is_subtype(&parent, sup),
                    None => false,
                }
            }
            TypeKind::Functor(sup_functor) => {
                let TypeKind::Functor(sub_functor) = sub.kind() else {
                    return false;
                };
                let sup_args = sup_functor.args.borrow().clone();
                let sub_args = sub_functor.args.borrow().clone();
                if sup_args.len() != sub_args.len() {
                    return false;
                }
                for (sub_arg, sup_arg) in sub_args.iter().zip(sup_args.iter()) {
                    if let (Some(sub_arg), Some(sup_arg)) = (sub_arg, sup_arg) {
                        if !self.is_subtype(sub_arg, sup_arg) {
                            return false;
                        }
                    }
                }
                let sub_ret = sub_functor.return_type.borrow().clone();
                let sup_ret = sup_functor.return_type.borrow().clone();
                match (sub_ret, sup_ret) {
                    (Some(sub_ret), Some(sup_ret)) => self.is_subtype(&sub_ret, &sup_ret),
                    _ => true,
                }
            }
            TypeKind::Generic(sup_generic) => {
                if let TypeKind::Interface(target) = sup_generic.target.kind() {
                    let declared = target.generics.borrow().clone();
                    if sup_generic.args.len() != declared.len() {
                        self.error_plain("Type argument count mismatch in generic");
                        return false;
                    }
                    for (def, arg) in declared.iter().zip(sup_generic.args.iter()) {
                        self.current_env_mut()
                            .generic_resolutions
                            .insert(def.clone(), Some(arg.clone()));
                    }
                    let target = sup_generic.target.clone();
                    return self.is_subtype(sub, &target);
                }

                let TypeKind::Generic(sub_generic) = sub.kind() else {
                    return false;
                };
                if sub_generic.args.len() != sup_generic.args.len() {
                    return false;
                }
                for (sub_arg, sup_arg) in sub_generic.args.iter().zip(sup_generic.args.iter()) {
                    if !self.is_subtype(&sub_arg.clone(), &sup_arg.clone()) {
                        return false;
                    }
                }
                let sub_target = sub_generic.target.clone();
                let sup_target = sup_generic.target.clone();
                self.is_subtype(&sub_target, &sup_target)
            }
            TypeKind::GenericDef(def) => {
                let extends = def.extends.clone();
                match extends {
                    None => self.resolve_generic_argument(sub, sup),
                    Some(bound) => {
                        if self.is_subtype(sub, &bound) {
                            self.resolve_generic_argument(sub, sup)
                        } else {
                            false
                        }
                    }
                }
            }
            TypeKind::Union(union) => {
                let left = union.left.clone();
                let right = union.right.clone();
                self.is_subtype(sub, &left) || self.is_subtype(sub, &right)
            }
            TypeKind::Interface(sup_object) => {
                let Some(sub_object) = sub.as_object() else {
                    return false;
                };
                let sup_fields: Vec<(String, Type)> = sup_object
                    .fields
                    .borrow()
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.clone()))
                    .collect();
                for (name, field_ty) in sup_fields {
                    let found = sub_object.fields.borrow().get(&name).cloned();
                    match found {
                        Some(found) => {
                            if !self.is_subtype(&found, &field_ty) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                let sup_methods: Vec<(String, Type)> = sup_object
                    .methods
                    .borrow()
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.clone()))
                    .collect();
                for (name, method_ty) in sup_methods {
                    let found = sub_object.methods.borrow().get(&name).cloned();
                    match found {
                        Some(found) => {
                            if !self.is_subtype(&found, &method_ty) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            }
        }
    }

    fn resolve_generic_argument(&mut self, sub: &Type, def: &Type) -> bool {
        for index in (0..self.envs.len()).rev() {
            let entry = self.envs[index].generic_resolutions.get(def).cloned();
            match entry {
                Some(None) => {
                    self.envs[index]
                        .generic_resolutions
                        .insert(def.clone(), Some(sub.clone()));
                    return true;
                }
                Some(Some(bound)) => return self.is_subtype(sub, &bound),
                None => {}
            }
        }
        false
    }

    fn find_generic_resolution(&self, def: &Type) -> Option<Type> {
        for env in self.envs.iter().rev() {
            if let Some(entry) = env.generic_resolutions.get(def) {
                return entry.clone();
            }
        }
        None
    }

    /// Substitute generic definitions with their current resolutions. Call
    /// sites pop their argument environment before the surrounding expression
    /// compares against the returned type, so the return type is resolved
    /// while the bindings are still alive.
    fn resolve_type(&self, ty: &Type) -> Type {
        match ty.kind() {
            TypeKind::GenericDef(_) => match self.find_generic_resolution(ty) {
                Some(inner) => inner,
                None => ty.clone(),
            },
            TypeKind::Generic(generic) => {
                let target = self.resolve_type(&generic.target);
                let args = generic
                    .args
                    .iter()
                    .map(|arg| self.resolve_type(arg))
                    .collect();
                Type::generic(target, args)
            }
            TypeKind::Union(union) => Type::union(
                self.resolve_type(&union.left),
                self.resolve_type(&union.right),
            ),
            _ => ty.clone(),
        }
    }

    pub fn type_of_literal(&self, literal: &Literal) -> Type {
        match literal {
            Literal::Number(_) => self.builtins.number.clone(),
            Literal::Bool(_) => self.builtins.bool_.clone(),
            Literal::Nil => self.builtins.nil.clone(),
            Literal::Str(_) => self.builtins.string.clone(),
            Literal::Atom(_) => self.builtins.atom.clone(),
        }
    }

    fn push_global_env(&mut self) {
        let mut env = TypeEnv::new(FunctionKind::Script);
        let builtins = &self.builtins;
        for (name, ty) in [
            ("Number", &builtins.number),
            ("Nil", &builtins.nil),
            ("Bool", &builtins.bool_),
            ("Atom", &builtins.atom),
            ("String", &builtins.string),
            ("Never", &builtins.never),
            ("Any", &builtins.any),
            ("Task", &builtins.task_def),
        ] {
            env.type_defs.insert(name.to_string(), ty.clone());
        }
        for (name, ty) in [("List", &builtins.list_def), ("Map", &builtins.map_def)] {
            env.type_defs.insert(name.to_string(), ty.clone());
            let init = ty
                .as_object()
                .and_then(|object| object.methods.borrow().get("init").cloned());
            if let Some(init) = init {
                env.locals.insert(name.to_string(), init);
            }
        }
        self.envs.push(env);
    }

    fn register_task_module(&mut self) {
        let module = Type::simple("Task");
        if let Some(object) = module.as_object() {
            let callback = Type::functor();
            *callback
                .as_functor()
                .expect("functor type")
                .return_type
                .borrow_mut() = Some(self.builtins.any.clone());

            let spawn = Type::functor();
            {
                let functor = spawn.as_functor().expect("functor type");
                functor.args.borrow_mut().push(Some(callback));
                *functor.return_type.borrow_mut() = Some(self.builtins.task_def.clone());
            }
            object.methods.borrow_mut().insert("spawn".to_string(), spawn);
        }
        self.define_builtin_module("task", "Task", module);
    }

    pub fn define_builtin_module(&mut self, path: &str, name: &str, ty: Type) {
        self.modules.insert(path.to_string(), ty.clone());
        self.builtin_modules.insert(name.to_string(), ty);
    }

    fn push_env(&mut self, kind: FunctionKind) {
        self.envs.push(TypeEnv::new(kind));
    }

    fn pop_env(&mut self) -> TypeEnv {
        self.envs.pop().expect("environment stack is never empty")
    }

    fn current_env_mut(&mut self) -> &mut TypeEnv {
        self.envs.last_mut().expect("environment stack is never empty")
    }

    fn error_at(&mut self, span: Span, lexeme: &str, message: &str) {
        let error = TypeError {
            message: message.to_string(),
            line: span.line,
            lexeme: lexeme.to_string(),
        };
        eprintln!("{error}");
        self.errors.push(error);
    }

    fn error_ident(&mut self, name: &Ident, message: &str) {
        let span = name.span;
        let lexeme = name.name.clone();
        self.error_at(span, &lexeme, message);
    }

    fn error_plain(&mut self, message: &str) {
        let error = TypeError {
            message: message.to_string(),
            line: 0,
            lexeme: String::new(),
        };
        eprintln!("{error}");
        self.errors.push(error);
    }

    fn resolve_local(&self, name: &str) -> Option<Type> {
        for env in self.envs.iter().rev() {
            if let Some(ty) = env.locals.get(name) {
                return Some(ty.clone());
            }
        }
        None
    }

    fn resolve_type_def(&self, name: &str) -> Option<Type> {
        for env in self.envs.iter().rev() {
            if let Some(ty) = env.type_defs.get(name) {
                return Some(ty.clone());
            }
        }
        None
    }

    fn variable_type(&mut self, name: &Ident) -> Option<Type> {
        if let Some(ty) = self.resolve_local(&name.name) {
            return Some(ty);
        }
        if let Some(ty) = self.builtin_modules.get(&name.name) {
            return Some(ty.clone());
        }
        self.error_ident(name, "Undefined variable");
        None
    }

    fn type_def(&mut self, name: &Ident) -> Option<Type> {
        match self.resolve_type_def(&name.name) {
            Some(ty) => Some(ty),
            None => {
                self.error_ident(name, "Undefined type");
                None
            }
        }
    }

    /// Loads a module by path: parse, check, and wrap the file's top-level
    /// locals as the fields of a fresh module type. Repeated imports of one
    /// path return the cached type identity.
    pub fn parse_file(&mut self, path: &str) -> Option<Type> {
        if let Some(cached) = self.modules.get(path) {
            return Some(cached.clone());
        }

        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(_) => {
                self.error_plain(&format!("Could not read module \"{path}\""));
                return None;
            }
        };

        let saved_envs = std::mem::take(&mut self.envs);
        let saved_class = self.current_class.take();
        let saved_functor = self.current_functor.take();
        let saved_assignment = self.current_assignment.take();
        self.push_global_env();

        match parse_program(&source) {
            Ok(stmts) => self.check(&stmts),
            Err(errors) => {
                for error in errors {
                    self.errors.push(TypeError {
                        message: error.message,
                        line: error.line,
                        lexeme: error.lexeme,
                    });
                }
            }
        }

        let module_env = self.pop_env();
        let module = Type::simple(path);
        if let Some(object) = module.as_object() {
            let mut fields = object.fields.borrow_mut();
            for (name, ty) in module_env.locals {
                fields.insert(name, ty);
            }
        }
        self.modules.insert(path.to_string(), module.clone());

        self.envs = saved_envs;
        self.current_class = saved_class;
        self.current_functor = saved_functor;
        self.current_assignment = saved_assignment;
        Some(module)
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Option<Type> {
        match stmt {
            Stmt::Expression { expr, .. } => self.check_expr(expr),
            Stmt::Var {
                name, ty, init, ..
            } => {
                let mut var_type = ty.as_ref().and_then(|node| self.eval_type_node(node));

                if let Some(init) = init {
                    let saved = self.current_assignment.take();
                    self.current_assignment = var_type.clone();
                    let value_type = self.check_expr(init);
                    self.current_assignment = saved;

                    match (&var_type, &value_type) {
                        (Some(declared), Some(value)) => {
                            let declared = declared.clone();
                            let value = value.clone();
                            if !self.is_subtype(&value, &declared) {
                                self.error_ident(name, "Type mismatch in var");
                            }
                        }
                        (None, Some(value)) => var_type = Some(value.clone()),
                        _ => {}
                    }
                }

                if let Some(var_type) = var_type {
                    self.current_env_mut()
                        .locals
                        .insert(name.name.clone(), var_type);
                }
                None
            }
            Stmt::Block { stmts, .. } => {
                let mut last = None;
                for stmt in stmts {
                    last = self.check_stmt(stmt);
                }
                last
            }
            Stmt::Function(func) => {
                let ty = self.check_function(func);
                if let Some(ty) = &ty {
                    self.current_env_mut()
                        .locals
                        .insert(func.name.name.clone(), ty.clone());
                }
                ty
            }
            Stmt::Class {
                name,
                generics,
                superclass,
                body,
                ..
            } => self.check_class(name, generics, superclass.as_ref(), body),
            Stmt::Interface {
                name,
                generics,
                super_name,
                body,
                ..
            } => self.check_interface(name, generics, super_name.as_ref(), body),
            Stmt::MethodSig { .. } => None,
            Stmt::While {
                condition, body, ..
            } => {
                self.check_expr(condition);
                self.check_stmt(body);
                None
            }
            Stmt::For {
                init,
                condition,
                increment,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(condition) = condition {
                    self.check_expr(condition);
                }
                if let Some(increment) = increment {
                    self.check_expr(increment);
                }
                self.check_stmt(body);
                None
            }
            Stmt::Break { .. } => None,
            Stmt::Return { keyword, value, .. } => {
                let value_type = match value {
                    Some(value) => self.check_expr(value),
                    None => Some(self.builtins.nil.clone()),
                };
                let Some(functor) = self.current_functor.clone() else {
                    return value_type;
                };
                let declared = functor
                    .as_functor()
                    .expect("current functor is a functor type")
                    .return_type
                    .borrow()
                    .clone();
                match (declared, &value_type) {
                    (Some(declared), Some(value)) => {
                        let value = value.clone();
                        if !self.is_subtype(&value, &declared) {
                            self.error_at(*keyword, "return", "Return type mismatch");
                        }
                    }
                    (None, Some(value)) => {
                        *functor
                            .as_functor()
                            .expect("current functor is a functor type")
                            .return_type
                            .borrow_mut() = Some(value.clone());
                    }
                    _ => {}
                }
                value_type
            }
            Stmt::Import { path, alias, .. } => {
                let Expr::Literal {
                    value: Literal::Str(path),
                    ..
                } = path
                else {
                    return None;
                };
                let path = path.clone();
                if let Some(module) = self.parse_file(&path) {
                    self.current_env_mut()
                        .locals
                        .insert(alias.name.clone(), module);
                }
                None
            }
            Stmt::TypeAlias {
                name,
                generics,
                target,
                ..
            } => {
                self.push_env(FunctionKind::Initializer);
                self.declare_generic_params(generics);
                let result = self.eval_type_node(target);
                self.pop_env();
                if let Some(result) = result {
                    self.current_env_mut()
                        .type_defs
                        .insert(name.name.clone(), result);
                }
                None
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Option<Type> {
        let ty = self.expr_type(expr);
        if let Some(ty) = &ty {
            self.node_types.insert(expr.id(), ty.clone());
        }
        ty
    }

    fn expr_type(&mut self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Literal { value, .. } => Some(self.type_of_literal(value)),
            Expr::Unary { op, right, .. } => {
                let right = self.check_expr(right);
                match op {
                    UnaryOp::Not => Some(self.builtins.bool_.clone()),
                    UnaryOp::Neg => right,
                }
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(right);
                self.check_expr(left)
            }
            Expr::Logical { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
                Some(self.builtins.bool_.clone())
            }
            Expr::Grouping { expr, .. } => self.check_expr(expr),
            Expr::Variable { name } => self.variable_type(name),
            Expr::Assign { name, value, .. } => {
                let value_type = self.check_expr(value);
                let named_type = self.variable_type(name);
                if let (Some(value), Some(named)) = (&value_type, &named_type) {
                    let value = value.clone();
                    let named = named.clone();
                    if !self.is_subtype(&value, &named) {
                        self.error_ident(name, "Type mismatch");
                    }
                }
                named_type.or(value_type)
            }
            Expr::Call {
                callee,
                paren,
                args,
                ..
            } => {
                let callee_type = self.check_expr(callee)?;
                let Some(functor) = callee_type.as_functor() else {
                    self.error_at(*paren, "(", "Type is not callable");
                    return None;
                };

                let declared_args = functor.args.borrow().clone();
                let generics = functor.generics.borrow().clone();
                let return_type = functor.return_type.borrow().clone();

                // Argument count mismatches are tolerated for now.
                // TODO: varargs

                self.push_env(FunctionKind::Function);
                for def in &generics {
                    self.current_env_mut()
                        .generic_resolutions
                        .insert(def.clone(), None);
                }

                for (index, arg) in args.iter().enumerate() {
                    let arg_type = self.check_expr(arg);
                    let declared = declared_args.get(index).cloned().flatten();
                    if let (Some(arg_type), Some(declared)) = (arg_type, declared) {
                        if !self.is_subtype(&arg_type, &declared) {
                            self.error_at(*paren, "(", "Type mismatch");
                            self.pop_env();
                            return None;
                        }
                    }
                }

                let resolved = return_type.map(|ty| self.resolve_type(&ty));
                self.pop_env();
                resolved
            }
            Expr::GetItem {
                object,
                bracket,
                index,
                ..
            } => {
                let object_type = self.check_expr(object)?;
                let list_def = self.builtins.list_def.clone();
                let map_def = self.builtins.map_def.clone();

                if self.is_subtype(&object_type, &list_def) {
                    let index_type = self.check_expr(index);
                    let number = self.builtins.number.clone();
                    if let Some(index_type) = index_type {
                        if !self.is_subtype(&index_type, &number) {
                            self.error_at(*bracket, "[", "Index must be a number");
                            return None;
                        }
                    }
                    match object_type.kind() {
                        TypeKind::Generic(generic) if !generic.args.is_empty() => {
                            Some(generic.args[0].clone())
                        }
                        _ => Some(self.builtins.never.clone()),
                    }
                } else if self.is_subtype(&object_type, &map_def) {
                    let index_type = self.check_expr(index);
                    match object_type.kind() {
                        TypeKind::Generic(generic) if generic.args.len() == 2 => {
                            let key = generic.args[0].clone();
                            if let Some(index_type) = index_type {
                                if !self.is_subtype(&index_type, &key) {
                                    self.error_at(*bracket, "[", "Key type mismatch");
                                    return None;
                                }
                            }
                            Some(generic.args[1].clone())
                        }
                        _ => Some(self.builtins.never.clone()),
                    }
                } else {
                    self.error_at(
                        *bracket,
                        "[",
                        "Cannot get item on something other than a list or map",
                    );
                    None
                }
            }
            Expr::Get { object, name, .. } => {
                let object_type = self.check_expr(object)?;
                let root = self.member_root(&object_type, name)?;
                self.member_type(&root, name)
            }
            Expr::Set {
                object,
                name,
                value,
                ..
            } => {
                let value_type = self.check_expr(value);
                let object_type = self.check_expr(object)?;
                let root = self.member_root(&object_type, name)?;
                let field_type = self.member_type(&root, name)?;
                if let Some(value_type) = value_type {
                    if !self.is_subtype(&value_type, &field_type) {
                        self.error_ident(name, "Type mismatch in setter");
                    }
                }
                Some(field_type)
            }
            Expr::Super { method, .. } => {
                let Some(class) = self.current_class.clone() else {
                    self.error_ident(method, "Can't use 'super' outside of a class");
                    return None;
                };
                let parent = class
                    .as_object()
                    .and_then(|object| object.super_type.borrow().clone());
                let Some(parent) = parent else {
                    self.error_ident(method, "Can't use 'super' in a class with no superclass");
                    return None;
                };
                self.member_type(&parent, method)
            }
            Expr::This { .. } => self.current_class.clone(),
            Expr::Yield { expr, .. } => {
                if let Some(expr) = expr {
                    self.check_expr(expr);
                }
                Some(self.builtins.any.clone())
            }
            Expr::Lambda {
                generics,
                params,
                return_ty,
                body,
                ..
            } => self.check_functor_body(generics, params, return_ty.as_ref(), body, FunctionKind::Function),
            Expr::List { bracket, items, .. } => self.check_list_literal(*bracket, items),
            Expr::Map {
                brace,
                keys,
                values,
                ..
            } => self.check_map_literal(*brace, keys, values),
            Expr::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_expr(condition);
                let result = self.check_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
                result
            }
        }
    }

    fn member_root(&mut self, object_type: &Type, name: &Ident) -> Option<Type> {
        match object_type.kind() {
            TypeKind::Simple(_) | TypeKind::Interface(_) => Some(object_type.clone()),
            TypeKind::Generic(generic) => Some(generic.target.clone()),
            TypeKind::GenericDef(def) => match &def.extends {
                Some(bound) => Some(bound.clone()),
                None => {
                    self.error_ident(name, "Attempting to get from invalid generic type.");
                    None
                }
            },
            _ => {
                self.error_ident(name, "Attempting to get from invalid type.");
                None
            }
        }
    }

    fn member_type(&mut self, root: &Type, name: &Ident) -> Option<Type> {
        let Some(object) = root.as_object() else {
            self.error_ident(name, "Invalid field");
            return None;
        };
        let found = object
            .methods
            .borrow()
            .get(&name.name)
            .cloned()
            .or_else(|| object.fields.borrow().get(&name.name).cloned());
        match found {
            Some(ty) => Some(ty),
            None => {
                self.error_ident(name, "Invalid field");
                None
            }
        }
    }

    fn declare_generic_params(&mut self, generics: &[TypeNode]) -> Vec<Type> {
        let mut defs = Vec::new();
        for node in generics {
            let TypeNode::GenericParam { name, extends, .. } = node else {
                continue;
            };
            let extend_type = extends.as_ref().and_then(|node| self.eval_type_node(node));
            let def = Type::generic_def(&name.name, extend_type);
            self.current_env_mut()
                .type_defs
                .insert(name.name.clone(), def.clone());
            defs.push(def);
        }
        defs
    }

    fn check_functor_body(
        &mut self,
        generics: &[TypeNode],
        params: &[sable_syntax::Param],
        return_ty: Option<&TypeNode>,
        body: &[Stmt],
        kind: FunctionKind,
    ) -> Option<Type> {
        self.push_env(kind);
        let generic_defs = self.declare_generic_params(generics);

        let functor = Type::functor();
        {
            let inner = functor.as_functor().expect("functor type");
            *inner.generics.borrow_mut() = generic_defs;
        }
        let saved_functor = self.current_functor.replace(functor.clone());

        for param in params {
            let param_type = match &param.ty {
                Some(node) => self.eval_type_node(node),
                None => Some(self.builtins.any.clone()),
            };
            functor
                .as_functor()
                .expect("functor type")
                .args
                .borrow_mut()
                .push(param_type.clone());
            if let Some(param_type) = param_type {
                self.current_env_mut()
                    .locals
                    .insert(param.name.name.clone(), param_type);
            }
        }

        let declared_return = return_ty.and_then(|node| self.eval_type_node(node));
        *functor
            .as_functor()
            .expect("functor type")
            .return_type
            .borrow_mut() = declared_return;

        self.check(body);

        {
            let inner = functor.as_functor().expect("functor type");
            let mut return_type = inner.return_type.borrow_mut();
            if return_type.is_none() {
                *return_type = Some(self.builtins.nil.clone());
            }
        }

        self.pop_env();
        self.current_functor = saved_functor;
        Some(functor)
    }

    fn check_function(&mut self, func: &Function) -> Option<Type> {
        self.check_functor_body(
            &func.generics,
            &func.params,
            func.return_ty.as_ref(),
            &func.body,
            func.kind,
        )
    }

    /// Checks one method of a class body. The method's functor lands in the
    /// class's method table before the body is checked so that the body can
    /// call the method through `this`.
    fn check_method(&mut self, func: &Function, class_type: &Type, class_functor: &Type) {
        self.push_env(func.kind);

        self.current_env_mut()
            .locals
            .insert("this".to_string(), class_type.clone());

        let functor = Type::functor();
        let saved_functor = self.current_functor.replace(functor.clone());

        for param in &func.params {
            let param_type = match &param.ty {
                Some(node) => self.eval_type_node(node),
                None => Some(self.builtins.any.clone()),
            };
            functor
                .as_functor()
                .expect("functor type")
                .args
                .borrow_mut()
                .push(param_type.clone());
            if let Some(param_type) = param_type {
                self.current_env_mut()
                    .locals
                    .insert(param.name.name.clone(), param_type);
            }
        }

        if let Some(object) = class_type.as_object() {
            object
                .methods
                .borrow_mut()
                .insert(func.name.name.clone(), functor.clone());
        }

        if func.kind == FunctionKind::Initializer {
            let args = functor
                .as_functor()
                .expect("functor type")
                .args
                .borrow()
                .clone();
            {
                let inner = class_functor.as_functor().expect("functor type");
                *inner.args.borrow_mut() = args;
            }
            *functor
                .as_functor()
                .expect("functor type")
                .return_type
                .borrow_mut() = Some(class_type.clone());
        } else {
            let return_type = func.return_ty.as_ref().and_then(|node| self.eval_type_node(node));
            *functor
                .as_functor()
                .expect("functor type")
                .return_type
                .borrow_mut() = return_type;
        }

        self.check(&func.body);

        {
            let inner = functor.as_functor().expect("functor type");
            let mut return_type = inner.return_type.borrow_mut();
            if return_type.is_none() {
                *return_type = Some(self.builtins.nil.clone());
            }
        }

        self.pop_env();
        self.current_functor = saved_functor;
    }

    fn check_class(
        &mut self,
        name: &Ident,
        generics: &[TypeNode],
        superclass: Option<&Ident>,
        body: &[Stmt],
    ) -> Option<Type> {
        let class_type = Type::simple(&name.name);
        // Bind the name before the body so methods can refer to their own
        // class.
        self.current_env_mut()
            .type_defs
            .insert(name.name.clone(), class_type.clone());

        let saved_class = self.current_class.replace(class_type.clone());
        let class_functor = Type::functor();

        self.push_env(FunctionKind::Initializer);
        let generic_defs = self.declare_generic_params(generics);
        if let Some(object) = class_type.as_object() {
            *object.generics.borrow_mut() = generic_defs;
        }

        if let Some(parent_name) = superclass {
            if let Some(parent) = self.type_def(parent_name) {
                match parent.as_object() {
                    Some(parent_object) if matches!(parent.kind(), TypeKind::Simple(_)) => {
                        if let Some(object) = class_type.as_object() {
                            object
                                .fields
                                .borrow_mut()
                                .extend(parent_object.fields.borrow().clone());
                            object
                                .methods
                                .borrow_mut()
                                .extend(parent_object.methods.borrow().clone());
                            *object.super_type.borrow_mut() = Some(parent.clone());
                        }
                    }
                    _ => self.error_ident(parent_name, "Superclass must be a class."),
                }
            }
        }

        for member in body {
            match member {
                Stmt::Function(func) => {
                    self.check_method(func, &class_type, &class_functor);
                }
                Stmt::Var {
                    name: field_name,
                    ty,
                    init,
                    ..
                } => {
                    let field_type = ty.as_ref().and_then(|node| self.eval_type_node(node));
                    if let Some(init) = init {
                        let value_type = self.check_expr(init);
                        if let (Some(field_type), Some(value_type)) = (&field_type, &value_type) {
                            let field_type = field_type.clone();
                            let value_type = value_type.clone();
                            if !self.is_subtype(&value_type, &field_type) {
                                self.error_ident(field_name, "Type mismatch.");
                            }
                        }
                    }
                    if let (Some(field_type), Some(object)) = (field_type, class_type.as_object())
                    {
                        object
                            .fields
                            .borrow_mut()
                            .insert(field_name.name.clone(), field_type);
                    }
                }
                _ => {}
            }
        }

        *class_functor
            .as_functor()
            .expect("functor type")
            .return_type
            .borrow_mut() = Some(class_type.clone());

        self.pop_env();

        self.current_env_mut()
            .locals
            .insert(name.name.clone(), class_functor);

        self.current_class = saved_class;
        Some(class_type)
    }

    fn check_interface(
        &mut self,
        name: &Ident,
        generics: &[TypeNode],
        super_name: Option<&Ident>,
        body: &[Stmt],
    ) -> Option<Type> {
        let interface_type = Type::interface(&name.name);
        self.current_env_mut()
            .type_defs
            .insert(name.name.clone(), interface_type.clone());

        if let Some(parent_name) = super_name {
            if let Some(parent) = self.type_def(parent_name) {
                if matches!(parent.kind(), TypeKind::Interface(_)) {
                    let parent_object = parent.as_object().expect("interface has object tables");
                    if let Some(object) = interface_type.as_object() {
                        object
                            .fields
                            .borrow_mut()
                            .extend(parent_object.fields.borrow().clone());
                        object
                            .methods
                            .borrow_mut()
                            .extend(parent_object.methods.borrow().clone());
                        *object.super_type.borrow_mut() = Some(parent.clone());
                    }
                } else {
                    self.error_ident(
                        parent_name,
                        "Parent type for interface may only be an interface.",
                    );
                    return None;
                }
            }
        }

        self.push_env(FunctionKind::Initializer);
        let generic_defs = self.declare_generic_params(generics);
        if let Some(object) = interface_type.as_object() {
            *object.generics.borrow_mut() = generic_defs;
        }

        for member in body {
            match member {
                Stmt::MethodSig {
                    name: method_name,
                    kind,
                    params,
                    return_ty,
                    ..
                } => {
                    let functor = Type::functor();
                    for param in params {
                        let param_type = match &param.ty {
                            Some(node) => self.eval_type_node(node),
                            None => Some(self.builtins.any.clone()),
                        };
                        functor
                            .as_functor()
                            .expect("functor type")
                            .args
                            .borrow_mut()
                            .push(param_type);
                    }

                    let return_type = match kind {
                        FunctionKind::Initializer => Some(interface_type.clone()),
                        _ => return_ty.as_ref().and_then(|node| self.eval_type_node(node)),
                    };
                    {
                        let inner = functor.as_functor().expect("functor type");
                        let mut slot = inner.return_type.borrow_mut();
                        *slot = return_type.or_else(|| Some(self.builtins.nil.clone()));
                    }

                    if let Some(object) = interface_type.as_object() {
                        object
                            .methods
                            .borrow_mut()
                            .insert(method_name.name.clone(), functor);
                    }
                }
                Stmt::Var {
                    name: field_name,
                    ty,
                    ..
                } => {
                    let field_type = ty.as_ref().and_then(|node| self.eval_type_node(node));
                    if let (Some(field_type), Some(object)) =
                        (field_type, interface_type.as_object())
                    {
                        object
                            .fields
                            .borrow_mut()
                            .insert(field_name.name.clone(), field_type);
                    }
                }
                _ => {}
            }
        }

        self.pop_env();
        None
    }

    fn check_list_literal(&mut self, bracket: Span, items: &[Expr]) -> Option<Type> {
        match self.current_assignment.clone() {
            None => {
                let mut item_type = self.builtins.never.clone();
                if !items.is_empty() {
                    let mut first = None;
                    for (index, item) in items.iter().enumerate() {
                        let ty = self.check_expr(item);
                        if index == 0 {
                            first = ty;
                        }
                    }
                    if let Some(first) = first {
                        item_type = first;
                    }
                }
                Some(Type::generic(self.builtins.list_def.clone(), vec![item_type]))
            }
            Some(expected) => {
                let TypeKind::Generic(generic) = expected.kind() else {
                    self.error_at(bracket, "[", "Type mismatch");
                    return Some(expected.clone());
                };
                let list_def = self.builtins.list_def.clone();
                let target = generic.target.clone();
                if !self.is_subtype(&list_def, &target) {
                    self.error_at(bracket, "[", "Type mismatch, incompatible type");
                    return Some(expected.clone());
                }
                if generic.args.len() != 1 {
                    self.error_at(bracket, "[", "Type mismatch, missing type annotation");
                    return Some(expected.clone());
                }
                let item_type = generic.args[0].clone();
                let saved = self.current_assignment.take();
                self.current_assignment = Some(item_type.clone());
                for item in items {
                    let eval_type = self.check_expr(item);
                    if let Some(eval_type) = eval_type {
                        if !self.is_subtype(&eval_type, &item_type) {
                            self.error_at(bracket, "[", "Type mismatch, incompatible types");
                        }
                    }
                }
                self.current_assignment = saved;
                Some(expected)
            }
        }
    }

    fn check_map_literal(&mut self, brace: Span, keys: &[Expr], values: &[Expr]) -> Option<Type> {
        match self.current_assignment.clone() {
            None => {
                let mut key_type = self.builtins.never.clone();
                let mut value_type = self.builtins.never.clone();
                if !keys.is_empty() {
                    let mut first_key = None;
                    let mut first_value = None;
                    for (index, (key, value)) in keys.iter().zip(values.iter()).enumerate() {
                        let key_ty = self.check_expr(key);
                        let value_ty = self.check_expr(value);
                        if index == 0 {
                            first_key = key_ty;
                            first_value = value_ty;
                        }
                    }
                    if let Some(first_key) = first_key {
                        key_type = first_key;
                    }
                    if let Some(first_value) = first_value {
                        value_type = first_value;
                    }
                }
                Some(Type::generic(
                    self.builtins.map_def.clone(),
                    vec![key_type, value_type],
                ))
            }
            Some(expected) => {
                let TypeKind::Generic(generic) = expected.kind() else {
                    self.error_at(brace, "{", "Type mismatch");
                    return Some(expected.clone());
                };
                let map_def = self.builtins.map_def.clone();
                let target = generic.target.clone();
                if !self.is_subtype(&map_def, &target) {
                    self.error_at(brace, "{", "Type mismatch, incompatible type");
                    return Some(expected.clone());
                }
                if generic.args.len() != 2 {
                    self.error_at(brace, "{", "Type mismatch, missing type annotation");
                    return Some(expected.clone());
                }
                let key_type = generic.args[0].clone();
                let value_type = generic.args[1].clone();
                let saved = self.current_assignment.take();
                for (key, value) in keys.iter().zip(values.iter()) {
                    self.current_assignment = Some(key_type.clone());
                    let eval_key = self.check_expr(key);
                    if let Some(eval_key) = eval_key {
                        if !self.is_subtype(&eval_key, &key_type) {
                            self.error_at(brace, "{", "Map key type mismatch, incompatible types");
                        }
                    }
                    self.current_assignment = Some(value_type.clone());
                    let eval_value = self.check_expr(value);
                    if let Some(eval_value) = eval_value {
                        if !self.is_subtype(&eval_value, &value_type) {
                            self.error_at(
                                brace,
                                "{",
                                "Map value type mismatch, incompatible types",
                            );
                        }
                    }
                }
                self.current_assignment = saved;
                Some(expected)
            }
        }
    }

    fn eval_type_node(&mut self, node: &TypeNode) -> Option<Type> {
        match node {
            TypeNode::Simple { name, generics } => {
                let target = self.type_def(name)?;
                if generics.is_empty() {
                    return Some(target);
                }

                let declared_len = target
                    .as_object()
                    .map(|object| object.generics.borrow().len());
                if let Some(declared_len) = declared_len {
                    if declared_len != generics.len() {
                        self.error_ident(name, "Type argument count mismatch in generic");
                    }
                }

                let mut args = Vec::new();
                for generic in generics {
                    args.push(self.eval_type_node(generic)?);
                }
                Some(Type::generic(target, args))
            }
            TypeNode::Functor {
                generics,
                args,
                return_ty,
                ..
            } => {
                let functor = Type::functor();
                self.push_env(FunctionKind::Function);

                let mut defs = Vec::new();
                for node in generics {
                    let TypeNode::GenericParam { name, .. } = node else {
                        continue;
                    };
                    let def = Type::generic_def(&name.name, None);
                    self.current_env_mut()
                        .type_defs
                        .insert(name.name.clone(), def.clone());
                    defs.push(def);
                }

                for arg in args {
                    let arg_type = arg.as_ref().and_then(|node| self.eval_type_node(node));
                    functor
                        .as_functor()
                        .expect("functor type")
                        .args
                        .borrow_mut()
                        .push(arg_type);
                }

                let return_type = return_ty.as_ref().and_then(|node| self.eval_type_node(node));
                {
                    let inner = functor.as_functor().expect("functor type");
                    *inner.return_type.borrow_mut() = return_type;
                    *inner.generics.borrow_mut() = defs;
                }

                self.pop_env();
                Some(functor)
            }
            TypeNode::Union { left, right, .. } => {
                let left = self.eval_type_node(left)?;
                let right = self.eval_type_node(right)?;
                Some(Type::union(left, right))
            }
            TypeNode::GenericParam { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{check_program, Checker, Type, TypeKind};
    use sable_parser::parse_program;

    fn check_source(source: &str) -> Result<Checker, Vec<super::TypeError>> {
        let stmts = parse_program(source).expect("parse program");
        check_program(&stmts)
    }

    #[test]
    fn accepts_matching_var_annotation() {
        assert!(check_source("var x: Number = 1;").is_ok());
    }

    #[test]
    fn reports_var_annotation_mismatch() {
        let errors = check_source("var y: Number = \"s\";").expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("Type mismatch") && err.lexeme == "y"));
    }

    #[test]
    fn reports_undefined_variable() {
        let errors = check_source("missing;").expect_err("expected type errors");
        assert!(errors.iter().any(|err| err.message == "Undefined variable"));
    }

    #[test]
    fn class_instances_satisfy_structural_interfaces() {
        let source = r#"
interface HasName {
    var name: String;
}
class P {
    var name: String;
}
var p: HasName = P();
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn structural_interface_rejects_missing_field() {
        let source = r#"
interface HasName {
    var name: String;
}
class Q {
    var other: Number;
}
var q: HasName = Q();
"#;
        assert!(check_source(source).is_err());
    }

    #[test]
    fn infers_generic_argument_at_call_site() {
        let source = r#"
fun id<T>(x: T): T {
    return x;
}
var n: Number = id(7);
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn rejects_wrongly_typed_generic_result() {
        let source = r#"
fun id<T>(x: T): T {
    return x;
}
var s: String = id(7);
"#;
        assert!(check_source(source).is_err());
    }

    #[test]
    fn infers_list_literal_element_type() {
        let source = "var xs = [1, 2, 3];";
        let checker = check_source(source).expect("check program");
        let xs = checker.resolve_local("xs").expect("xs is bound");
        let TypeKind::Generic(generic) = xs.kind() else {
            panic!("expected generic list type");
        };
        assert_eq!(generic.target, checker.builtins.list_def);
        assert_eq!(generic.args[0], checker.builtins.number);
    }

    #[test]
    fn rejects_list_literal_element_mismatch() {
        let errors =
            check_source("var ys: List<String> = [1];").expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("incompatible types")));
    }

    #[test]
    fn checks_map_literals_against_annotation() {
        assert!(check_source("var m: Map<String, Number> = {\"a\": 1};").is_ok());
        assert!(check_source("var m: Map<String, Number> = {1: 1};").is_err());
    }

    #[test]
    fn subtyping_is_reflexive() {
        let mut checker = Checker::new();
        let number = checker.builtins.number.clone();
        let functor = Type::functor();
        let union = Type::union(
            checker.builtins.number.clone(),
            checker.builtins.string.clone(),
        );
        for ty in [number, functor, union] {
            assert!(checker.is_subtype(&ty, &ty));
        }
    }

    #[test]
    fn any_is_a_top_type() {
        let mut checker = Checker::new();
        let number = checker.builtins.number.clone();
        let any = checker.builtins.any.clone();
        assert!(checker.is_subtype(&number, &any));
    }

    #[test]
    fn never_is_not_a_bottom_type() {
        let mut checker = Checker::new();
        let never = checker.builtins.never.clone();
        let number = checker.builtins.number.clone();
        let any = checker.builtins.any.clone();
        assert!(!checker.is_subtype(&never, &number));
        assert!(!checker.is_subtype(&number, &never));
        assert!(checker.is_subtype(&never, &any));
    }

    #[test]
    fn union_absorbs_both_sides() {
        let mut checker = Checker::new();
        let number = checker.builtins.number.clone();
        let string = checker.builtins.string.clone();
        let bool_ = checker.builtins.bool_.clone();
        let union = Type::union(number.clone(), string.clone());
        assert!(checker.is_subtype(&number, &union));
        assert!(checker.is_subtype(&string, &union));
        assert!(!checker.is_subtype(&bool_, &union));
    }

    #[test]
    fn reports_generic_arity_mismatch() {
        let errors =
            check_source("var xs: List<Number, String> = [1];").expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("Type argument count mismatch")));
    }

    #[test]
    fn methods_can_reference_their_own_class() {
        let source = r#"
class Node {
    fun me(): Node {
        return this;
    }
}
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn inherited_members_are_visible_through_subclass() {
        let source = r#"
class Base {
    var tag: String;
}
class Derived extends Base {
}
fun f(d: Derived): String {
    return d.tag;
}
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn subclass_is_subtype_of_superclass() {
        let source = r#"
class Base {
}
class Derived extends Base {
}
var b: Base = Derived();
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn reports_invalid_field_access() {
        let source = r#"
class P {
    var name: String;
}
var p: P = P();
p.missing;
"#;
        let errors = check_source(source).expect_err("expected type errors");
        assert!(errors.iter().any(|err| err.message == "Invalid field"));
    }

    #[test]
    fn reports_setter_type_mismatch() {
        let source = r#"
class P {
    var name: String;
}
var p: P = P();
p.name = 3;
"#;
        let errors = check_source(source).expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message == "Type mismatch in setter"));
    }

    #[test]
    fn reports_uncallable_callee() {
        let errors = check_source("var x = 1; x();").expect_err("expected type errors");
        assert!(errors.iter().any(|err| err.message == "Type is not callable"));
    }

    #[test]
    fn reports_return_type_mismatch() {
        let source = r#"
fun f(): Number {
    return "s";
}
"#;
        let errors = check_source(source).expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message == "Return type mismatch"));
    }

    #[test]
    fn infers_missing_return_type_from_body() {
        let source = r#"
fun f() {
    return 1;
}
var n: Number = f();
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn list_index_must_be_a_number() {
        let source = r#"
var xs: List<Number> = [1];
xs["zero"];
"#;
        let errors = check_source(source).expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message == "Index must be a number"));
    }

    #[test]
    fn list_index_yields_element_type() {
        let source = r#"
var xs: List<Number> = [1, 2];
var n: Number = xs[0];
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn interface_supertype_must_be_an_interface() {
        let source = r#"
class A {
}
interface I extends A {
}
"#;
        let errors = check_source(source).expect_err("expected type errors");
        assert!(errors
            .iter()
            .any(|err| err.message.contains("may only be an interface")));
    }

    #[test]
    fn type_aliases_resolve_to_their_target() {
        let source = r#"
type Id = Number;
var x: Id = 1;
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn union_annotation_accepts_either_side() {
        let source = r#"
var x: Number | Nil = nil;
x = 3;
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn task_module_spawn_returns_a_task() {
        let source = r#"
var t: Task = Task.spawn(fun(): Any => 1);
"#;
        assert!(check_source(source).is_ok());
    }

    #[test]
    fn checking_twice_is_deterministic() {
        let source = "var y: Number = \"s\"; var z: String = 1;";
        let stmts = parse_program(source).expect("parse program");
        let first = check_program(&stmts).expect_err("expected type errors");
        let second = check_program(&stmts).expect_err("expected type errors");
        let first: Vec<String> = first.iter().map(|err| err.message.clone()).collect();
        let second: Vec<String> = second.iter().map(|err| err.message.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn import_caching_returns_the_same_module_identity() {
        let dir = std::env::temp_dir().join("sable_check_import_test");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("util.sb");
        std::fs::write(&path, "var answer: Number = 42;\n").expect("write module");
        let path = path.to_string_lossy().to_string();

        let mut checker = Checker::new();
        let first = checker.parse_file(&path).expect("load module");
        let second = checker.parse_file(&path).expect("load module again");
        assert_eq!(first, second);

        let answer = first
            .as_object()
            .and_then(|object| object.fields.borrow().get("answer").cloned())
            .expect("module exposes answer");
        assert_eq!(answer, checker.builtins.number);
    }
}
