//! Recursive-descent parser for the Kotlin-like fixture language.
//!
//! Supported: top-level and member functions, classes with primary and
//! secondary constructors, properties with getters, annotations, and inside
//! function bodies local variables, assignments, `if`/`while`/`do`/`for` with
//! labels, jumps, `throw`, local functions and local classes.

use std::collections::HashMap;

use kestrel_core::{FqName, Name, Span};
use kestrel_hir::{
    AccessorKind, Annotation, AnnotationArgument, AnnotationEntry, AssignTarget, BinaryOp, Body,
    BodyBuilder, Callee, ConstValue, DeclId, DeclKind, DeclTree, ExprId, ExprKind, Local,
    LocalId, LocalKind, ScopeId, StmtId, StmtKind, TypeRef, UnaryOp,
};

use crate::lexer::{lex, Token, TokenKind};
use crate::types::parse_type;

/// A function with a body, ready to be analyzed.
#[derive(Debug, Clone)]
pub struct FunctionFixture {
    pub decl: DeclId,
    pub name: Name,
    pub container: Option<DeclId>,
    /// The whole declaration, annotations and modifiers included.
    pub span: Span,
    /// `( ... )`, parentheses included.
    pub param_list: Span,
    pub body: Body,
    pub is_member: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ParsedFile {
    pub decls: DeclTree,
    pub functions: Vec<FunctionFixture>,
    pub annotations: Vec<AnnotationEntry>,
    pub classes: Vec<DeclId>,
    /// Supertype names written after `:` for each class.
    pub supertypes: HashMap<DeclId, Vec<String>>,
    /// Parameter names and types of primary constructors.
    pub ctor_params: HashMap<DeclId, Vec<(Name, String)>>,
}

pub(crate) fn parse_file(source: &str) -> ParsedFile {
    let mut parser = Parser {
        source,
        tokens: lex(source),
        pos: 0,
        out: ParsedFile::default(),
        pending_overrides: Vec::new(),
    };
    while !parser.at(TokenKind::Eof) {
        if parser.eat(TokenKind::Semi) {
            continue;
        }
        parser.parse_item(None);
    }
    parser.resolve_overrides();
    parser.out
}

const MODIFIERS: &[&str] = &[
    "private",
    "public",
    "internal",
    "protected",
    "override",
    "open",
    "abstract",
    "annotation",
    "data",
    "sealed",
    "final",
    "inline",
];

struct ScopeFrame {
    id: ScopeId,
    names: Vec<(Name, LocalId)>,
}

struct BodyCx {
    builder: BodyBuilder,
    scopes: Vec<ScopeFrame>,
}

impl BodyCx {
    fn new(builder: BodyBuilder) -> Self {
        let root = builder.root_scope();
        Self {
            builder,
            scopes: vec![ScopeFrame {
                id: root,
                names: Vec::new(),
            }],
        }
    }

    fn scratch(offset: usize) -> Self {
        Self::new(BodyBuilder::new(Span::empty(offset)))
    }

    fn current_scope(&self) -> ScopeId {
        self.scopes.last().map(|frame| frame.id).unwrap_or(self.builder.root_scope())
    }

    fn push_scope(&mut self, start: usize) -> ScopeId {
        let parent = self.current_scope();
        let id = self.builder.alloc_scope(parent, Span::empty(start));
        self.scopes.push(ScopeFrame {
            id,
            names: Vec::new(),
        });
        id
    }

    fn pop_scope(&mut self, end: usize) {
        if let Some(frame) = self.scopes.pop() {
            let start = self.builder.scope_span(frame.id).start;
            self.builder.set_scope_span(frame.id, Span::new(start, end));
        }
    }

    fn declare(&mut self, name: Name, local: LocalId) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.names.push((name, local));
        }
    }

    fn lookup(&self, name: &str) -> Option<LocalId> {
        self.scopes.iter().rev().find_map(|frame| {
            frame
                .names
                .iter()
                .rev()
                .find(|(candidate, _)| candidate.as_str() == name)
                .map(|(_, local)| *local)
        })
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    out: ParsedFile,
    /// `override` members and their class, resolved once every class is known.
    pending_overrides: Vec<(DeclId, DeclId)>,
}

impl<'a> Parser<'a> {
    // === Token helpers ===

    fn peek(&self) -> Token {
        self.nth(0)
    }

    fn nth(&self, n: usize) -> Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx]
    }

    fn text(&self, token: Token) -> &'a str {
        &self.source[token.span.start..token.span.end]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Ident && self.text(token) == keyword
    }

    fn bump(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Token {
        let token = self.peek();
        assert!(
            token.kind == kind,
            "expected {kind:?} at {}, found {:?} `{}`",
            token.span.start,
            token.kind,
            self.text(token)
        );
        self.bump()
    }

    fn expect_keyword(&mut self, keyword: &str) -> Token {
        assert!(
            self.at_keyword(keyword),
            "expected `{keyword}` at {}",
            self.peek().span.start
        );
        self.bump()
    }

    fn expect_ident(&mut self) -> (Name, Span) {
        let token = self.expect(TokenKind::Ident);
        (Name::new(self.text(token)), token.span)
    }

    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            return 0;
        }
        self.tokens[self.pos - 1].span.end
    }

    fn is_assign_op(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
        )
    }

    // === Declarations ===

    fn parse_item(&mut self, container: Option<DeclId>) {
        let start = self.peek().span.start;
        let annotations = self.parse_annotations();
        let modifiers = self.parse_modifiers();
        let token = self.peek();
        match self.text(token) {
            "fun" => self.parse_function(start, container, annotations, &modifiers),
            "class" | "interface" | "object" => {
                self.parse_class(start, container, annotations);
            }
            "val" | "var" => self.parse_property(start, container, annotations),
            "constructor" => self.parse_secondary_constructor(start, container, annotations),
            "init" => {
                self.bump();
                let mut scratch = BodyCx::scratch(start);
                self.parse_block(&mut scratch);
            }
            other => panic!("unexpected `{other}` at {}", token.span.start),
        }
    }

    fn parse_modifiers(&mut self) -> Vec<&'a str> {
        let mut out = Vec::new();
        while self.peek().kind == TokenKind::Ident && MODIFIERS.contains(&self.text(self.peek())) {
            let token = self.bump();
            out.push(self.text(token));
        }
        out
    }

    fn parse_annotations(&mut self) -> Vec<(Annotation, AnnotationEntry)> {
        let mut out = Vec::new();
        while self.at(TokenKind::At) {
            out.push(self.parse_annotation());
        }
        out
    }

    fn parse_annotation(&mut self) -> (Annotation, AnnotationEntry) {
        let at = self.expect(TokenKind::At);
        let (first, mut name_span) = self.expect_ident();
        let mut written = first.as_str().to_string();
        while self.at(TokenKind::Dot) && !self.peek().newline_before {
            self.bump();
            let (segment, span) = self.expect_ident();
            written.push('.');
            written.push_str(segment.as_str());
            name_span = name_span.cover(span);
        }

        let mut cx = BodyCx::new(BodyBuilder::new(Span::new(at.span.start, name_span.end)));
        let mut arguments = Vec::new();
        let mut stmts = Vec::new();
        if self.at(TokenKind::LParen) && !self.peek().newline_before {
            self.bump();
            while !self.at(TokenKind::RParen) {
                let name = if self.peek().kind == TokenKind::Ident && self.nth(1).kind == TokenKind::Eq
                {
                    let (name, _) = self.expect_ident();
                    self.bump();
                    Some(name)
                } else {
                    None
                };
                let value = self.parse_expr(&mut cx);
                let scope = cx.current_scope();
                let span = cx_expr_span(&cx, value);
                stmts.push(cx.builder.alloc_stmt(StmtKind::Expr(value), span, scope));
                arguments.push(AnnotationArgument { name, value });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen);
        }

        let span = Span::new(at.span.start, self.prev_end());
        cx.builder.set_span(span);
        let scope = cx.current_scope();
        let root = cx.builder.alloc_stmt(StmtKind::Block(stmts), span, scope);
        let body = cx.builder.finish(root);

        let fq_name = if written == "Deprecated" {
            FqName::new("kotlin.Deprecated")
        } else {
            FqName::new(&written)
        };
        let mut annotation = Annotation::new(fq_name).with_span(span);
        let mut positional = 0;
        for argument in &arguments {
            let key = match &argument.name {
                Some(name) => name.clone(),
                None => {
                    positional += 1;
                    if positional > 1 {
                        continue;
                    }
                    Name::new("value")
                }
            };
            if let Some(value) = const_value(&body, argument.value) {
                annotation = annotation.with_argument(key, value);
            }
        }

        let entry = AnnotationEntry {
            name: Name::new(&written),
            span,
            arguments,
            body,
            annotated: None,
        };
        (annotation, entry)
    }

    fn attach_annotations(&mut self, decl: DeclId, annotations: Vec<(Annotation, AnnotationEntry)>) {
        for (annotation, mut entry) in annotations {
            self.out.decls.add_annotation(decl, annotation);
            entry.annotated = Some(decl);
            self.out.annotations.push(entry);
        }
    }

    fn parse_function(
        &mut self,
        start: usize,
        container: Option<DeclId>,
        annotations: Vec<(Annotation, AnnotationEntry)>,
        modifiers: &[&str],
    ) {
        self.expect_keyword("fun");
        let (name, _) = self.expect_ident();
        let decl = self.out.decls.alloc(name.clone(), DeclKind::Other);
        if let Some(container) = container {
            self.out.decls.set_container(decl, container);
            if modifiers.contains(&"override") {
                self.pending_overrides.push((decl, container));
            }
        }
        self.attach_annotations(decl, annotations);

        let builder = BodyBuilder::new(Span::empty(start)).with_owner(decl, name.clone());
        let mut cx = BodyCx::new(builder);
        let param_start = self.peek().span.start;
        self.parse_params(&mut cx, LocalKind::Param);
        let param_list = Span::new(param_start, self.prev_end());

        let return_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_ref())
        } else {
            None
        };
        self.out.decls.set_type(
            decl,
            return_type
                .as_ref()
                .map(|ty| parse_type(&ty.text))
                .unwrap_or_else(kestrel_hir::Type::unit),
        );

        if self.at(TokenKind::LBrace) {
            let root = self.parse_block(&mut cx);
            let span = Span::new(start, self.prev_end());
            cx.builder.set_span(span);
            self.out.decls.set_span(decl, span);
            let body = cx.builder.finish(root);
            self.out.functions.push(FunctionFixture {
                decl,
                name,
                container,
                span,
                param_list,
                body,
                is_member: container.is_some(),
            });
        } else {
            if self.eat(TokenKind::Eq) {
                self.parse_expr(&mut cx);
            }
            self.out
                .decls
                .set_span(decl, Span::new(start, self.prev_end()));
        }
    }

    /// Parses `( ... )`; every parameter becomes a local of `kind` in the current scope.
    fn parse_params(&mut self, cx: &mut BodyCx, kind: LocalKind) -> (Vec<LocalId>, Vec<(Name, String)>) {
        self.expect(TokenKind::LParen);
        let mut locals = Vec::new();
        let mut typed = Vec::new();
        while !self.at(TokenKind::RParen) {
            let param_start = self.peek().span.start;
            self.parse_annotations();
            self.parse_modifiers();
            let mutable = self.at_keyword("var");
            if self.at_keyword("val") || self.at_keyword("var") {
                self.bump();
            }
            let (name, name_span) = self.expect_ident();
            self.expect(TokenKind::Colon);
            let ty = self.parse_type_ref();
            if self.eat(TokenKind::Eq) {
                let mut scratch = BodyCx::scratch(param_start);
                self.parse_expr(&mut scratch);
            }
            let scope = cx.current_scope();
            let local = cx.builder.alloc_local(Local {
                name: name.clone(),
                kind,
                span: name_span,
                decl_span: Span::new(param_start, self.prev_end()),
                scope,
                ty: Some(ty.clone()),
                mutable,
            });
            cx.declare(name.clone(), local);
            locals.push(local);
            typed.push((name, ty.text));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        (locals, typed)
    }

    fn parse_class(
        &mut self,
        start: usize,
        container: Option<DeclId>,
        annotations: Vec<(Annotation, AnnotationEntry)>,
    ) -> DeclId {
        let keyword = self.bump();
        let has_constructor = self.text(keyword) == "class";
        let (name, _) = self.expect_ident();
        let class = self.out.decls.alloc(name.clone(), DeclKind::Other);
        self.out.classes.push(class);
        self.out
            .decls
            .set_type(class, kestrel_hir::Type::named(name.as_str()));
        if let Some(container) = container {
            self.out.decls.set_container(class, container);
        }
        self.attach_annotations(class, annotations);

        if has_constructor {
            let ctor = self.out.decls.alloc(name.clone(), DeclKind::Constructor);
            self.out.decls.set_container(ctor, class);
            self.out
                .decls
                .set_type(ctor, kestrel_hir::Type::named(name.as_str()));
            if self.at(TokenKind::LParen) {
                let mut scratch = BodyCx::scratch(self.peek().span.start);
                let params_start = self.pos;
                let (_, typed) = self.parse_params(&mut scratch, LocalKind::Param);
                // `val`/`var` constructor parameters are properties too.
                for idx in params_start..self.pos {
                    let token = self.tokens[idx];
                    let is_property = token.kind == TokenKind::Ident
                        && matches!(self.text(token), "val" | "var");
                    if !is_property {
                        continue;
                    }
                    let name_token = self.tokens[idx + 1];
                    let prop_name = self.text(name_token);
                    if let Some((_, ty)) = typed.iter().find(|(n, _)| n.as_str() == prop_name) {
                        let prop = self.out.decls.alloc(prop_name, DeclKind::Other);
                        self.out.decls.set_container(prop, class);
                        self.out.decls.set_type(prop, parse_type(ty));
                    }
                }
                self.out.ctor_params.insert(ctor, typed);
            }
        }

        if self.eat(TokenKind::Colon) {
            let mut supers = Vec::new();
            loop {
                let ty = self.parse_type_ref();
                if self.at(TokenKind::LParen) {
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
                }
                supers.push(ty.text);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.out.supertypes.insert(class, supers);
        }

        if self.eat(TokenKind::LBrace) {
            while !self.at(TokenKind::RBrace) {
                if self.eat(TokenKind::Semi) {
                    continue;
                }
                self.parse_item(Some(class));
            }
            self.expect(TokenKind::RBrace);
        }
        self.out
            .decls
            .set_span(class, Span::new(start, self.prev_end()));
        class
    }

    fn parse_secondary_constructor(
        &mut self,
        start: usize,
        container: Option<DeclId>,
        annotations: Vec<(Annotation, AnnotationEntry)>,
    ) {
        self.expect_keyword("constructor");
        let class = container.expect("constructor outside of a class");
        let name = self
            .out
            .decls
            .get(class)
            .map(|decl| decl.name.clone())
            .unwrap_or_else(|| Name::new("<init>"));
        let ctor = self.out.decls.alloc(name.clone(), DeclKind::Constructor);
        self.out.decls.set_container(ctor, class);
        self.out
            .decls
            .set_type(ctor, kestrel_hir::Type::named(name.as_str()));
        self.attach_annotations(ctor, annotations);

        let mut scratch = BodyCx::scratch(start);
        self.parse_params(&mut scratch, LocalKind::Param);
        if self.eat(TokenKind::Colon) {
            self.bump();
            self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
        }
        if self.at(TokenKind::LBrace) {
            self.parse_block(&mut scratch);
        }
        self.out
            .decls
            .set_span(ctor, Span::new(start, self.prev_end()));
    }

    fn parse_property(
        &mut self,
        start: usize,
        container: Option<DeclId>,
        annotations: Vec<(Annotation, AnnotationEntry)>,
    ) {
        self.bump();
        let (name, _) = self.expect_ident();
        let prop = self.out.decls.alloc(name, DeclKind::Other);
        if let Some(container) = container {
            self.out.decls.set_container(prop, container);
        }
        self.attach_annotations(prop, annotations);

        let ty = if self.eat(TokenKind::Colon) {
            Some(parse_type(&self.parse_type_ref().text))
        } else {
            None
        };
        if self.eat(TokenKind::Eq) {
            let mut scratch = BodyCx::scratch(start);
            self.parse_expr(&mut scratch);
        }
        if let Some(ty) = &ty {
            self.out.decls.set_type(prop, ty.clone());
        }
        self.out
            .decls
            .set_span(prop, Span::new(start, self.prev_end()));

        // Accessors: `get() = ...`, optionally annotated.
        loop {
            let saved = self.pos;
            let accessor_start = self.peek().span.start;
            let annotations = self.parse_annotations();
            let kind = match self.text(self.peek()) {
                "get" if self.nth(1).kind == TokenKind::LParen => AccessorKind::Getter,
                "set" if self.nth(1).kind == TokenKind::LParen => AccessorKind::Setter,
                _ => {
                    self.pos = saved;
                    break;
                }
            };
            let (accessor_name, _) = self.expect_ident();
            let accessor = self
                .out
                .decls
                .alloc(accessor_name, DeclKind::Accessor(kind));
            self.out.decls.set_container(accessor, prop);
            if let Some(ty) = &ty {
                self.out.decls.set_type(accessor, ty.clone());
            }
            self.attach_annotations(accessor, annotations);

            let mut scratch = BodyCx::scratch(accessor_start);
            self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
            if self.eat(TokenKind::Eq) {
                self.parse_expr(&mut scratch);
            } else if self.at(TokenKind::LBrace) {
                self.parse_block(&mut scratch);
            }
        }
    }

    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) {
        self.expect(open);
        let mut depth = 1;
        while depth > 0 && !self.at(TokenKind::Eof) {
            let token = self.bump();
            if token.kind == open {
                depth += 1;
            } else if token.kind == close {
                depth -= 1;
            }
        }
    }

    fn resolve_overrides(&mut self) {
        for (member, class) in std::mem::take(&mut self.pending_overrides) {
            let Some(member_name) = self.out.decls.get(member).map(|d| d.name.clone()) else {
                continue;
            };
            let supers = self.out.supertypes.get(&class).cloned().unwrap_or_default();
            for super_name in supers {
                let short = super_name.split('<').next().unwrap_or("").trim();
                let Some(super_class) = self.out.decls.find_by_name(None, short) else {
                    continue;
                };
                if let Some(overridden) = self
                    .out
                    .decls
                    .find_by_name(Some(super_class), member_name.as_str())
                {
                    self.out.decls.add_override(member, overridden);
                }
            }
        }
    }

    // === Types ===

    fn parse_type_ref(&mut self) -> TypeRef {
        let start = self.peek().span.start;
        self.parse_type_inner();
        let span = Span::new(start, self.prev_end());
        TypeRef {
            text: self.source[span.start..span.end].to_string(),
            span,
        }
    }

    fn parse_type_inner(&mut self) {
        if self.eat(TokenKind::Star) {
            return;
        }
        self.expect(TokenKind::Ident);
        while self.at(TokenKind::Dot) && self.nth(1).kind == TokenKind::Ident {
            self.bump();
            self.bump();
        }
        if self.at(TokenKind::LAngle) {
            self.bump();
            loop {
                self.parse_type_inner();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RAngle);
        }
        if self.at(TokenKind::Question) && !self.peek().newline_before {
            self.bump();
        }
    }

    /// `<T, U>` followed by `(`; restores the position when the tokens are not
    /// type arguments.
    fn try_parse_type_args(&mut self) -> Option<Vec<TypeRef>> {
        let saved = self.pos;
        if !self.eat(TokenKind::LAngle) {
            return None;
        }
        let mut args = Vec::new();
        loop {
            if !(self.at(TokenKind::Ident) || self.at(TokenKind::Star)) {
                self.pos = saved;
                return None;
            }
            let start = self.peek().span.start;
            let ok = self.try_type_inner();
            if !ok {
                self.pos = saved;
                return None;
            }
            let span = Span::new(start, self.prev_end());
            args.push(TypeRef {
                text: self.source[span.start..span.end].to_string(),
                span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(TokenKind::RAngle) || !self.at(TokenKind::LParen) {
            self.pos = saved;
            return None;
        }
        Some(args)
    }

    fn try_type_inner(&mut self) -> bool {
        if self.eat(TokenKind::Star) {
            return true;
        }
        if !self.eat(TokenKind::Ident) {
            return false;
        }
        while self.at(TokenKind::Dot) && self.nth(1).kind == TokenKind::Ident {
            self.bump();
            self.bump();
        }
        if self.eat(TokenKind::LAngle) {
            loop {
                if !self.try_type_inner() {
                    return false;
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            if !self.eat(TokenKind::RAngle) {
                return false;
            }
        }
        self.eat(TokenKind::Question);
        true
    }

    // === Statements ===

    fn parse_block(&mut self, cx: &mut BodyCx) -> StmtId {
        let open = self.expect(TokenKind::LBrace);
        let scope = cx.push_scope(open.span.start);
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            assert!(!self.at(TokenKind::Eof), "unterminated block at {}", open.span.start);
            if self.eat(TokenKind::Semi) {
                continue;
            }
            stmts.push(self.parse_stmt(cx));
        }
        let close = self.expect(TokenKind::RBrace);
        let span = Span::new(open.span.start, close.span.end);
        cx.pop_scope(close.span.end);
        cx.builder.alloc_stmt(StmtKind::Block(stmts), span, scope)
    }

    fn parse_branch(&mut self, cx: &mut BodyCx) -> StmtId {
        if self.at(TokenKind::LBrace) {
            self.parse_block(cx)
        } else {
            self.parse_stmt(cx)
        }
    }

    fn parse_label(&mut self) -> Option<Name> {
        let name = self.peek();
        let at = self.nth(1);
        let keyword = self.nth(2);
        let is_label = name.kind == TokenKind::Ident
            && at.kind == TokenKind::At
            && name.span.end == at.span.start
            && keyword.kind == TokenKind::Ident
            && matches!(self.text(keyword), "while" | "do" | "for");
        if !is_label {
            return None;
        }
        self.bump();
        self.bump();
        Some(Name::new(self.text(name)))
    }

    /// `@label` directly attached to `break`/`continue`/`return`.
    fn parse_jump_label(&mut self) -> Option<Name> {
        let at = self.peek();
        if at.kind != TokenKind::At || at.span.start != self.prev_end() {
            return None;
        }
        self.bump();
        let (name, _) = self.expect_ident();
        Some(name)
    }

    fn parse_stmt(&mut self, cx: &mut BodyCx) -> StmtId {
        let start = self.peek().span.start;
        let label = self.parse_label();
        let token = self.peek();
        let keyword = if token.kind == TokenKind::Ident {
            self.text(token)
        } else {
            ""
        };

        match keyword {
            "val" | "var" => self.parse_let(cx, start),
            "if" => {
                self.bump();
                self.expect(TokenKind::LParen);
                let condition = self.parse_expr(cx);
                self.expect(TokenKind::RParen);
                let then_branch = self.parse_branch(cx);
                let else_branch = if self.at_keyword("else") {
                    self.bump();
                    Some(self.parse_branch(cx))
                } else {
                    None
                };
                self.finish_stmt(
                    cx,
                    StmtKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    start,
                )
            }
            "while" => {
                self.bump();
                self.expect(TokenKind::LParen);
                let condition = self.parse_expr(cx);
                self.expect(TokenKind::RParen);
                let body = self.parse_branch(cx);
                self.finish_stmt(
                    cx,
                    StmtKind::While {
                        label,
                        condition,
                        body,
                    },
                    start,
                )
            }
            "do" => {
                self.bump();
                let body = self.parse_block(cx);
                self.expect_keyword("while");
                self.expect(TokenKind::LParen);
                let condition = self.parse_expr(cx);
                self.expect(TokenKind::RParen);
                self.finish_stmt(
                    cx,
                    StmtKind::DoWhile {
                        label,
                        body,
                        condition,
                    },
                    start,
                )
            }
            "for" => {
                self.bump();
                self.expect(TokenKind::LParen);
                let (name, name_span) = self.expect_ident();
                self.expect_keyword("in");
                let iterable = self.parse_expr(cx);
                self.expect(TokenKind::RParen);
                let scope = cx.push_scope(start);
                let local = cx.builder.alloc_local(Local {
                    name: name.clone(),
                    kind: LocalKind::Local,
                    span: name_span,
                    decl_span: name_span,
                    scope,
                    ty: None,
                    mutable: false,
                });
                cx.declare(name, local);
                let body = self.parse_branch(cx);
                cx.pop_scope(self.prev_end());
                self.finish_stmt(
                    cx,
                    StmtKind::For {
                        label,
                        local,
                        iterable,
                        body,
                    },
                    start,
                )
            }
            "return" => {
                self.bump();
                let label = self.parse_jump_label();
                let next = self.peek();
                let has_value = !next.newline_before
                    && !matches!(
                        next.kind,
                        TokenKind::RBrace | TokenKind::Semi | TokenKind::Eof
                    )
                    && !(next.kind == TokenKind::Ident && self.text(next) == "else");
                let value = has_value.then(|| self.parse_expr(cx));
                self.finish_stmt(cx, StmtKind::Return { label, value }, start)
            }
            "break" => {
                self.bump();
                let label = self.parse_jump_label();
                self.finish_stmt(cx, StmtKind::Break { label }, start)
            }
            "continue" => {
                self.bump();
                let label = self.parse_jump_label();
                self.finish_stmt(cx, StmtKind::Continue { label }, start)
            }
            "throw" => {
                self.bump();
                let value = self.parse_expr(cx);
                self.finish_stmt(cx, StmtKind::Throw(value), start)
            }
            "fun" => self.parse_local_function(cx, start),
            "class" => {
                self.bump();
                let (name, name_span) = self.expect_ident();
                if self.at(TokenKind::LParen) {
                    self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
                }
                if self.at(TokenKind::LBrace) && !self.peek().newline_before {
                    self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace);
                }
                let scope = cx.current_scope();
                let local = cx.builder.alloc_local(Local {
                    name: name.clone(),
                    kind: LocalKind::LocalClass,
                    span: name_span,
                    decl_span: Span::new(start, self.prev_end()),
                    scope,
                    ty: None,
                    mutable: false,
                });
                cx.declare(name, local);
                self.finish_stmt(cx, StmtKind::LocalClass { local }, start)
            }
            _ => self.parse_expr_stmt(cx, start),
        }
    }

    fn finish_stmt(&mut self, cx: &mut BodyCx, kind: StmtKind, start: usize) -> StmtId {
        let span = Span::new(start, self.prev_end());
        let scope = cx.current_scope();
        cx.builder.alloc_stmt(kind, span, scope)
    }

    fn parse_let(&mut self, cx: &mut BodyCx, start: usize) -> StmtId {
        let keyword = self.bump();
        let mutable = self.text(keyword) == "var";
        let (name, name_span) = self.expect_ident();
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_ref())
        } else {
            None
        };
        let initializer = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr(cx))
        } else {
            None
        };
        let scope = cx.current_scope();
        let local = cx.builder.alloc_local(Local {
            name: name.clone(),
            kind: LocalKind::Local,
            span: name_span,
            decl_span: Span::new(start, self.prev_end()),
            scope,
            ty,
            mutable,
        });
        cx.declare(name, local);
        self.finish_stmt(cx, StmtKind::Let { local, initializer }, start)
    }

    fn parse_local_function(&mut self, cx: &mut BodyCx, start: usize) -> StmtId {
        self.expect_keyword("fun");
        let (name, name_span) = self.expect_ident();
        let scope = cx.current_scope();
        let local = cx.builder.alloc_local(Local {
            name: name.clone(),
            kind: LocalKind::LocalFunction,
            span: name_span,
            decl_span: name_span,
            scope,
            ty: None,
            mutable: false,
        });
        cx.declare(name, local);

        cx.push_scope(start);
        let (params, _) = self.parse_params(cx, LocalKind::Param);
        if self.eat(TokenKind::Colon) {
            let ty = self.parse_type_ref();
            cx.builder.set_local_type(local, ty);
        }
        let body = self.parse_block(cx);
        cx.pop_scope(self.prev_end());

        cx.builder
            .set_local_decl_span(local, Span::new(start, self.prev_end()));
        self.finish_stmt(
            cx,
            StmtKind::LocalFunction {
                local,
                params,
                body,
            },
            start,
        )
    }

    fn parse_expr_stmt(&mut self, cx: &mut BodyCx, start: usize) -> StmtId {
        let first = self.peek();
        if first.kind == TokenKind::Ident && Self::is_assign_op(self.nth(1).kind) {
            let target_name = self.text(first);
            self.bump();
            let target = match cx.lookup(target_name) {
                Some(local) => AssignTarget::Local(local),
                None => AssignTarget::Name(Name::new(target_name)),
            };
            return self.parse_assignment(cx, target, first.span, start);
        }

        let expr = self.parse_expr(cx);
        if Self::is_assign_op(self.peek().kind) {
            let target_span = cx_expr_span(cx, expr);
            let ExprKind::FieldAccess { receiver, name } = cx_expr_kind(cx, expr) else {
                panic!("invalid assignment target at {}", target_span.start);
            };
            let target = AssignTarget::Field { receiver, name };
            return self.parse_assignment(cx, target, target_span, start);
        }
        self.finish_stmt(cx, StmtKind::Expr(expr), start)
    }

    fn parse_assignment(
        &mut self,
        cx: &mut BodyCx,
        target: AssignTarget,
        target_span: Span,
        start: usize,
    ) -> StmtId {
        let op = match self.bump().kind {
            TokenKind::PlusEq => Some(BinaryOp::Add),
            TokenKind::MinusEq => Some(BinaryOp::Sub),
            TokenKind::StarEq => Some(BinaryOp::Mul),
            TokenKind::SlashEq => Some(BinaryOp::Div),
            _ => None,
        };
        let value = self.parse_expr(cx);
        self.finish_stmt(
            cx,
            StmtKind::Assign {
                target,
                target_span,
                op,
                value,
            },
            start,
        )
    }

    // === Expressions ===

    fn parse_expr(&mut self, cx: &mut BodyCx) -> ExprId {
        self.parse_binary(cx, 0)
    }

    fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
        let op = match kind {
            TokenKind::OrOr => (BinaryOp::Or, 1),
            TokenKind::AndAnd => (BinaryOp::And, 2),
            TokenKind::EqEq => (BinaryOp::Eq, 3),
            TokenKind::NotEq => (BinaryOp::NotEq, 3),
            TokenKind::LAngle => (BinaryOp::Less, 4),
            TokenKind::RAngle => (BinaryOp::Greater, 4),
            TokenKind::LessEq => (BinaryOp::LessEq, 4),
            TokenKind::GreaterEq => (BinaryOp::GreaterEq, 4),
            TokenKind::Plus => (BinaryOp::Add, 5),
            TokenKind::Minus => (BinaryOp::Sub, 5),
            TokenKind::Star => (BinaryOp::Mul, 6),
            TokenKind::Slash => (BinaryOp::Div, 6),
            TokenKind::Percent => (BinaryOp::Rem, 6),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, cx: &mut BodyCx, min_prec: u8) -> ExprId {
        let mut lhs = self.parse_unary(cx);
        loop {
            let token = self.peek();
            let Some((op, prec)) = Self::binary_op(token.kind) else {
                break;
            };
            let continues_line = !token.newline_before || op.is_logical();
            if prec <= min_prec || !continues_line {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(cx, prec);
            let span = cx_expr_span(cx, lhs).cover(cx_expr_span(cx, rhs));
            let scope = cx.current_scope();
            lhs = cx
                .builder
                .alloc_expr(ExprKind::Binary { op, lhs, rhs }, span, scope);
        }
        lhs
    }

    fn parse_unary(&mut self, cx: &mut BodyCx) -> ExprId {
        let token = self.peek();
        let op = match token.kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let expr = self.parse_unary(cx);
                let span = Span::new(token.span.start, cx_expr_span(cx, expr).end);
                let scope = cx.current_scope();
                cx.builder
                    .alloc_expr(ExprKind::Unary { op, expr }, span, scope)
            }
            None => self.parse_postfix(cx),
        }
    }

    fn parse_postfix(&mut self, cx: &mut BodyCx) -> ExprId {
        let mut expr = self.parse_primary(cx);
        while self.at(TokenKind::Dot) {
            self.bump();
            let (name, name_span) = self.expect_ident();
            let type_args = self.try_parse_type_args().unwrap_or_default();
            let start = cx_expr_span(cx, expr).start;
            let scope = cx.current_scope();
            if self.at(TokenKind::LParen) && !self.peek().newline_before {
                let args = self.parse_args(cx);
                let span = Span::new(start, self.prev_end());
                expr = cx.builder.alloc_expr(
                    ExprKind::Call {
                        receiver: Some(expr),
                        callee: Callee::Name(name),
                        callee_span: name_span,
                        type_args,
                        args,
                    },
                    span,
                    scope,
                );
            } else {
                let span = Span::new(start, name_span.end);
                expr = cx.builder.alloc_expr(
                    ExprKind::FieldAccess {
                        receiver: expr,
                        name,
                    },
                    span,
                    scope,
                );
            }
        }
        expr
    }

    fn parse_args(&mut self, cx: &mut BodyCx) -> Vec<ExprId> {
        self.expect(TokenKind::LParen);
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_expr(cx));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        args
    }

    fn parse_primary(&mut self, cx: &mut BodyCx) -> ExprId {
        let token = self.bump();
        let scope = cx.current_scope();
        let text = self.text(token);
        let kind = match token.kind {
            TokenKind::Int => ExprKind::Int(text.parse().unwrap_or_default()),
            TokenKind::String => ExprKind::String(text.trim_matches('"').to_string()),
            TokenKind::LParen => {
                let inner = self.parse_expr(cx);
                self.expect(TokenKind::RParen);
                return inner;
            }
            TokenKind::Ident => match text {
                "true" => ExprKind::Bool(true),
                "false" => ExprKind::Bool(false),
                "null" => ExprKind::Null,
                "this" => ExprKind::This,
                _ => return self.parse_name_expr(cx, token),
            },
            other => panic!("unexpected {other:?} at {}", token.span.start),
        };
        cx.builder.alloc_expr(kind, token.span, scope)
    }

    fn parse_name_expr(&mut self, cx: &mut BodyCx, token: Token) -> ExprId {
        let text = self.text(token);
        let scope = cx.current_scope();

        if self.at(TokenKind::ColonColon) && self.text(self.nth(1)) == "class" {
            self.bump();
            let class_kw = self.bump();
            let ty = TypeRef {
                text: text.to_string(),
                span: token.span,
            };
            let span = Span::new(token.span.start, class_kw.span.end);
            return cx
                .builder
                .alloc_expr(ExprKind::ClassLiteral { ty }, span, scope);
        }

        let type_args = self.try_parse_type_args();
        if self.at(TokenKind::LParen) && !self.peek().newline_before {
            let args = self.parse_args(cx);
            let callee = match cx.lookup(text) {
                Some(local) => Callee::Local(local),
                None => Callee::Name(Name::new(text)),
            };
            let span = Span::new(token.span.start, self.prev_end());
            return cx.builder.alloc_expr(
                ExprKind::Call {
                    receiver: None,
                    callee,
                    callee_span: token.span,
                    type_args: type_args.unwrap_or_default(),
                    args,
                },
                span,
                scope,
            );
        }

        let kind = match cx.lookup(text) {
            Some(local) => ExprKind::Local(local),
            None => ExprKind::Name(Name::new(text)),
        };
        cx.builder.alloc_expr(kind, token.span, scope)
    }
}

fn cx_expr_span(cx: &BodyCx, expr: ExprId) -> Span {
    cx.builder.expr_data(expr).span
}

fn cx_expr_kind(cx: &BodyCx, expr: ExprId) -> ExprKind {
    cx.builder.expr_data(expr).kind.clone()
}

fn const_value(body: &Body, expr: ExprId) -> Option<ConstValue> {
    match &body.expr(expr).kind {
        ExprKind::String(text) => Some(ConstValue::String(text.clone())),
        ExprKind::Int(value) => Some(ConstValue::Int(*value)),
        ExprKind::Bool(value) => Some(ConstValue::Bool(*value)),
        ExprKind::ClassLiteral { ty } => Some(ConstValue::Class(parse_type(&ty.text))),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            expr,
        } => match body.expr(*expr).kind {
            ExprKind::Int(value) => Some(ConstValue::Int(-value)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declarations_and_overrides() {
        let file = parse_file(
            r#"
open class Super {
    @Deprecated("use bar")
    open fun foo() {}
}

class Sub : Super() {
    override fun foo() {}

    val size: Int
        @Deprecated("gone") get() = 1
}
"#,
        );
        let sub = file.decls.find_by_name(None, "Sub").unwrap();
        let super_class = file.decls.find_by_name(None, "Super").unwrap();
        let sub_foo = file.decls.find_by_name(Some(sub), "foo").unwrap();
        let super_foo = file.decls.find_by_name(Some(super_class), "foo").unwrap();
        assert_eq!(file.decls.get(sub_foo).unwrap().overrides, vec![super_foo]);
        assert!(file
            .decls
            .get(super_foo)
            .unwrap()
            .annotation("kotlin.Deprecated")
            .is_some());

        let size = file.decls.find_by_name(Some(sub), "size").unwrap();
        let getter = file.decls.find_by_name(Some(size), "get").unwrap();
        assert_eq!(
            file.decls.get(getter).unwrap().kind,
            DeclKind::Accessor(AccessorKind::Getter)
        );
        assert_eq!(file.annotations.len(), 2);
        assert_eq!(file.functions.len(), 2);
    }

    #[test]
    fn lowers_statements_with_scopes_and_labels() {
        let file = parse_file(
            r#"
fun f(a: Int): Int {
    var x = a
    outer@ while (x > 0) {
        for (i in items) {
            if (i == x) break@outer
            x -= 1
        }
    }
    fun helper(): Int { return x }
    return helper()
}
"#,
        );
        let body = &file.functions[0].body;
        let names: Vec<_> = body.locals().iter().map(|l| l.name.as_str().to_string()).collect();
        assert_eq!(names, vec!["a", "x", "i", "helper"]);

        let labelled_break = body
            .stmt_ids()
            .find(|stmt| matches!(&body.stmt(*stmt).kind, StmtKind::Break { label: Some(l) } if l == "outer"))
            .unwrap();
        assert!(body
            .ancestors(labelled_break)
            .any(|stmt| body.stmt(stmt).kind.loop_label().is_some()));

        let helper_call = body
            .expr_ids()
            .find(|expr| matches!(body.expr(*expr).kind, ExprKind::Call { callee: Callee::Local(_), .. }))
            .unwrap();
        assert!(body.expr_stmt(helper_call).is_some());
        assert_eq!(body.params().count(), 1);
    }
}
