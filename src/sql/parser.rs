use super::lexer::{tokenize, Token, TokenKind};
use super::names::*;
use super::tree::Element;
use super::{StatementParser, SyntaxError};
use crate::value::LiteralKind;

/// Words that cannot be used as unquoted identifiers or implicit aliases.
const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BY", "DELETE", "DESC", "DISTINCT", "FALSE", "FROM", "GROUP",
    "INNER", "INSERT", "INTO", "IS", "JOIN", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR",
    "ORDER", "SELECT", "SET", "TRUE", "UPDATE", "VALUES", "WHERE",
];

const AGGREGATES: &[&str] = &["COUNT", "SUM", "MIN", "MAX", "AVG"];

/// Catalog-free parser for the supported SQL subset.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqlParser;

impl StatementParser for SqlParser {
    fn parse(&self, sql: &str) -> Result<Element, SyntaxError> {
        let mut parser = Parser {
            tokens: tokenize(sql)?,
            pos: 0,
            params: 0,
        };
        parser.statement()
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl Parser {
    fn statement(&mut self) -> Result<Element, SyntaxError> {
        let root = if self.peek().is_keyword("SELECT") {
            self.select()?
        } else if self.peek().is_keyword("INSERT") {
            self.insert()?
        } else if self.peek().is_keyword("UPDATE") {
            self.update()?
        } else if self.peek().is_keyword("DELETE") {
            self.delete()?
        } else {
            return Err(self.error("expected SELECT, INSERT, UPDATE or DELETE"));
        };
        self.eat(&TokenKind::Semicolon);
        if self.peek().kind != TokenKind::Eof {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(root)
    }

    fn select(&mut self) -> Result<Element, SyntaxError> {
        self.expect_keyword("SELECT")?;
        let mut root = Element::new(SELECT);
        if self.eat_keyword("DISTINCT") {
            root.set_attr(ATTR_DISTINCT, "true");
        } else {
            self.eat_keyword("ALL");
        }

        let mut columns = Element::new(COLUMNS);
        loop {
            columns.push(self.select_item()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect_keyword("FROM")?;
        let mut tablescans = Element::new(TABLESCANS);
        let mut conditions = Vec::new();
        tablescans.push(self.table_ref()?);
        loop {
            if self.eat(&TokenKind::Comma) {
                tablescans.push(self.table_ref()?);
            } else if self.peek().is_keyword("JOIN") || self.peek().is_keyword("INNER") {
                self.eat_keyword("INNER");
                self.expect_keyword("JOIN")?;
                tablescans.push(self.table_ref()?);
                self.expect_keyword("ON")?;
                conditions.push(self.expr()?);
            } else {
                break;
            }
        }
        if self.eat_keyword("WHERE") {
            conditions.push(self.expr()?);
        }

        let mut group = None;
        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            let mut groupcolumns = Element::new(GROUPCOLUMNS);
            loop {
                groupcolumns.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            group = Some(groupcolumns);
        }

        let mut order = None;
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let mut ordercolumns = Element::new(ORDERCOLUMNS);
            loop {
                let expr = self.expr()?;
                let desc = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                ordercolumns.push(
                    Element::new(ORDERBY)
                        .with_attr(ATTR_DESC, desc.to_string())
                        .with_child(expr),
                );
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            order = Some(ordercolumns);
        }

        if self.eat_keyword("LIMIT") {
            let limit = self.unsigned("LIMIT")?;
            root.set_attr(ATTR_LIMIT, limit);
            if self.eat_keyword("OFFSET") {
                let offset = self.unsigned("OFFSET")?;
                root.set_attr(ATTR_OFFSET, offset);
            }
        }

        root.push(columns);
        root.push(self.parameters());
        root.push(tablescans);
        if let Some(condition) = conjunction(conditions) {
            root.push(Element::new(QUERYCONDITION).with_child(condition));
        }
        if let Some(group) = group {
            root.push(group);
        }
        if let Some(order) = order {
            root.push(order);
        }
        Ok(root)
    }

    fn insert(&mut self) -> Result<Element, SyntaxError> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.identifier("table name")?;
        let mut names = None;
        if self.eat(&TokenKind::LParen) {
            let mut list = Vec::new();
            loop {
                list.push(self.identifier("column name")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
            names = Some(list);
        }
        self.expect_keyword("VALUES")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let start = self.peek().pos;
        let mut values = Vec::new();
        loop {
            values.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        if let Some(names) = &names {
            if names.len() != values.len() {
                return Err(SyntaxError::new(
                    format!(
                        "INSERT lists {} columns but {} values",
                        names.len(),
                        values.len()
                    ),
                    start,
                ));
            }
        }

        let mut columns = Element::new(COLUMNS);
        for (i, value) in values.into_iter().enumerate() {
            let mut column = Element::new(COLUMN).with_child(value);
            if let Some(names) = &names {
                column.set_attr(ATTR_NAME, names[i].clone());
            }
            columns.push(column);
        }
        Ok(Element::new(INSERT)
            .with_attr(ATTR_TABLE, table)
            .with_child(columns)
            .with_child(self.parameters()))
    }

    fn update(&mut self) -> Result<Element, SyntaxError> {
        self.expect_keyword("UPDATE")?;
        let table = self.identifier("table name")?;
        self.expect_keyword("SET")?;
        let mut columns = Element::new(COLUMNS);
        loop {
            let name = self.identifier("column name")?;
            self.expect(&TokenKind::Eq, "'='")?;
            let value = self.expr()?;
            columns.push(
                Element::new(COLUMN)
                    .with_attr(ATTR_NAME, name)
                    .with_child(value),
            );
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let condition = self.where_clause()?;
        let mut root = Element::new(UPDATE)
            .with_attr(ATTR_TABLE, table)
            .with_child(columns)
            .with_child(self.parameters());
        if let Some(condition) = condition {
            root.push(condition);
        }
        Ok(root)
    }

    fn delete(&mut self) -> Result<Element, SyntaxError> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.identifier("table name")?;
        let condition = self.where_clause()?;
        let mut root = Element::new(DELETE)
            .with_attr(ATTR_TABLE, table)
            .with_child(self.parameters());
        if let Some(condition) = condition {
            root.push(condition);
        }
        Ok(root)
    }

    fn where_clause(&mut self) -> Result<Option<Element>, SyntaxError> {
        if self.eat_keyword("WHERE") {
            let expr = self.expr()?;
            Ok(Some(Element::new(QUERYCONDITION).with_child(expr)))
        } else {
            Ok(None)
        }
    }

    fn parameters(&self) -> Element {
        let mut parameters = Element::new(PARAMETERS);
        for index in 0..self.params {
            parameters.push(Element::new(PARAMETER).with_attr(ATTR_INDEX, index.to_string()));
        }
        parameters
    }

    fn select_item(&mut self) -> Result<Element, SyntaxError> {
        if self.eat(&TokenKind::Star) {
            return Ok(Element::new(STAR));
        }
        if self.is_name(0)
            && self.peek_at(1).kind == TokenKind::Dot
            && self.peek_at(2).kind == TokenKind::Star
        {
            let table = self.identifier("table name")?;
            self.advance();
            self.advance();
            return Ok(Element::new(STAR).with_attr(ATTR_TABLE, table));
        }
        let mut expr = self.expr()?;
        if let Some(alias) = self.alias()? {
            expr.set_attr(ATTR_ALIAS, alias);
        }
        Ok(expr)
    }

    fn table_ref(&mut self) -> Result<Element, SyntaxError> {
        let table = self.identifier("table name")?;
        let mut scan = Element::new(TABLESCAN).with_attr(ATTR_TABLE, table);
        if let Some(alias) = self.alias()? {
            scan.set_attr(ATTR_ALIAS, alias);
        }
        Ok(scan)
    }

    fn alias(&mut self) -> Result<Option<String>, SyntaxError> {
        if self.eat_keyword("AS") {
            return self.identifier("alias").map(Some);
        }
        if self.is_name(0) {
            return self.identifier("alias").map(Some);
        }
        Ok(None)
    }

    fn expr(&mut self) -> Result<Element, SyntaxError> {
        let first = self.and_expr()?;
        let mut terms = vec![first];
        while self.eat_keyword("OR") {
            terms.push(self.and_expr()?);
        }
        Ok(fold("or", terms))
    }

    fn and_expr(&mut self) -> Result<Element, SyntaxError> {
        let first = self.not_expr()?;
        let mut terms = vec![first];
        while self.eat_keyword("AND") {
            terms.push(self.not_expr()?);
        }
        Ok(fold("and", terms))
    }

    fn not_expr(&mut self) -> Result<Element, SyntaxError> {
        if self.eat_keyword("NOT") {
            let inner = self.not_expr()?;
            return Ok(operation("not", vec![inner]));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Element, SyntaxError> {
        let left = self.additive()?;
        let optype = match self.peek().kind {
            TokenKind::Eq => Some("equal"),
            TokenKind::NotEq => Some("notequal"),
            TokenKind::Lt => Some("lessthan"),
            TokenKind::LtEq => Some("lessthanorequalto"),
            TokenKind::Gt => Some("greaterthan"),
            TokenKind::GtEq => Some("greaterthanorequalto"),
            _ => None,
        };
        if let Some(optype) = optype {
            self.advance();
            let right = self.additive()?;
            return Ok(operation(optype, vec![left, right]));
        }
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            let test = operation("isnull", vec![left]);
            return Ok(if negated {
                operation("not", vec![test])
            } else {
                test
            });
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Element, SyntaxError> {
        let mut left = self.multiplicative()?;
        loop {
            let optype = match self.peek().kind {
                TokenKind::Plus => "add",
                TokenKind::Minus => "subtract",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = operation(optype, vec![left, right]);
        }
    }

    fn multiplicative(&mut self) -> Result<Element, SyntaxError> {
        let mut left = self.unary()?;
        loop {
            let optype = match self.peek().kind {
                TokenKind::Star => "multiply",
                TokenKind::Slash => "divide",
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = operation(optype, vec![left, right]);
        }
    }

    fn unary(&mut self) -> Result<Element, SyntaxError> {
        if self.eat(&TokenKind::Minus) {
            match self.peek().kind.clone() {
                TokenKind::Integer(text) => {
                    self.advance();
                    return Ok(literal(LiteralKind::Integer, &format!("-{text}")));
                }
                TokenKind::Decimal(text) => {
                    self.advance();
                    return Ok(literal(LiteralKind::Decimal, &format!("-{text}")));
                }
                _ => {
                    let inner = self.unary()?;
                    return Ok(operation("negate", vec![inner]));
                }
            }
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Element, SyntaxError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(text) => {
                self.advance();
                Ok(literal(LiteralKind::Integer, &text))
            }
            TokenKind::Decimal(text) => {
                self.advance();
                Ok(literal(LiteralKind::Decimal, &text))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(literal(LiteralKind::String, &text))
            }
            TokenKind::Question => {
                self.advance();
                let index = self.params;
                self.params += 1;
                Ok(Element::new(VALUE)
                    .with_attr(ATTR_ISPARAM, "true")
                    .with_attr(ATTR_INDEX, index.to_string()))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(ref word) if word == "TRUE" || word == "FALSE" => {
                self.advance();
                Ok(literal(LiteralKind::Boolean, &word.to_ascii_lowercase()))
            }
            TokenKind::Ident(ref word) if word == "NULL" => {
                self.advance();
                Ok(Element::new(VALUE).with_attr(ATTR_VALUETYPE, LiteralKind::Null.as_str()))
            }
            TokenKind::Ident(ref word)
                if AGGREGATES.contains(&word.as_str())
                    && self.peek_at(1).kind == TokenKind::LParen =>
            {
                self.aggregate(word.to_ascii_lowercase())
            }
            TokenKind::Ident(_) | TokenKind::QuotedIdent(_) => {
                let first = self.identifier("column name")?;
                if self.eat(&TokenKind::Dot) {
                    let column = self.identifier("column name")?;
                    Ok(Element::new(COLUMNREF)
                        .with_attr(ATTR_TABLE, first)
                        .with_attr(ATTR_COLUMN, column))
                } else {
                    Ok(Element::new(COLUMNREF).with_attr(ATTR_COLUMN, first))
                }
            }
            _ => Err(self.error("expected expression")),
        }
    }

    fn aggregate(&mut self, optype: String) -> Result<Element, SyntaxError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let mut agg = Element::new(AGGREGATION).with_attr(ATTR_OPTYPE, optype.as_str());
        if optype == "count" && self.eat(&TokenKind::Star) {
            agg.set_attr(ATTR_STAR, "true");
        } else {
            if self.eat_keyword("DISTINCT") {
                agg.set_attr(ATTR_DISTINCT, "true");
            }
            agg.push(self.expr()?);
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(agg)
    }

    fn unsigned(&mut self, clause: &str) -> Result<String, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Integer(text) => {
                self.advance();
                text.parse::<u64>()
                    .map(|n| n.to_string())
                    .map_err(|_| self.error(&format!("{clause} value is out of range")))
            }
            _ => Err(self.error(&format!("{clause} requires an integer constant"))),
        }
    }

    fn identifier(&mut self, what: &str) -> Result<String, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(word) if !RESERVED.contains(&word.as_str()) => {
                self.advance();
                Ok(word)
            }
            TokenKind::QuotedIdent(word) => {
                self.advance();
                Ok(word)
            }
            _ => Err(self.error(&format!("expected {what}"))),
        }
    }

    fn is_name(&self, offset: usize) -> bool {
        match &self.peek_at(offset).kind {
            TokenKind::Ident(word) => !RESERVED.contains(&word.as_str()),
            TokenKind::QuotedIdent(_) => true,
            _ => false,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), SyntaxError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SyntaxError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {keyword}")))
        }
    }

    fn error(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message, self.peek().pos)
    }
}

fn literal(kind: LiteralKind, text: &str) -> Element {
    Element::new(VALUE)
        .with_attr(ATTR_VALUETYPE, kind.as_str())
        .with_attr(ATTR_VALUE, text)
}

fn operation(optype: &str, operands: Vec<Element>) -> Element {
    let mut op = Element::new(OPERATION).with_attr(ATTR_OPTYPE, optype);
    op.children = operands;
    op
}

fn fold(optype: &str, mut terms: Vec<Element>) -> Element {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        operation(optype, terms)
    }
}

fn conjunction(conditions: Vec<Element>) -> Option<Element> {
    match conditions.len() {
        0 => None,
        _ => Some(fold("and", conditions)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Element {
        SqlParser.parse(sql).expect("parse succeeds")
    }

    #[test]
    fn select_tree_has_expected_sections() {
        let tree = parse("SELECT a, b AS bee FROM t WHERE a = 5 AND b = 'x' ORDER BY a DESC LIMIT 10");
        assert_eq!(tree.name, SELECT);
        assert_eq!(tree.attr(ATTR_LIMIT), Some("10"));
        let names: Vec<_> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [COLUMNS, PARAMETERS, TABLESCANS, QUERYCONDITION, ORDERCOLUMNS]
        );
        let columns = tree.child(COLUMNS).expect("columns");
        assert_eq!(columns.children[1].attr(ATTR_ALIAS), Some("BEE"));
        let cond = &tree.child(QUERYCONDITION).expect("where").children[0];
        assert_eq!(cond.attr(ATTR_OPTYPE), Some("and"));
        assert_eq!(cond.children.len(), 2);
        let literal = &cond.children[1].children[1];
        assert_eq!(literal.attr(ATTR_VALUETYPE), Some("string"));
        assert_eq!(literal.attr(ATTR_VALUE), Some("x"));
    }

    #[test]
    fn join_on_is_folded_into_condition() {
        let tree = parse("select * from a x join b y on x.id = y.id where x.v > 1");
        let scans = tree.child(TABLESCANS).expect("scans");
        assert_eq!(scans.children.len(), 2);
        assert_eq!(scans.children[1].attr(ATTR_ALIAS), Some("Y"));
        let cond = &tree.child(QUERYCONDITION).expect("where").children[0];
        assert_eq!(cond.attr(ATTR_OPTYPE), Some("and"));
        assert_eq!(cond.children[0].attr(ATTR_OPTYPE), Some("equal"));
    }

    #[test]
    fn user_parameters_are_numbered_and_listed() {
        let tree = parse("SELECT * FROM t WHERE a = ? AND b = ?");
        let params = tree.child(PARAMETERS).expect("parameters");
        assert_eq!(params.children.len(), 2);
        let cond = &tree.child(QUERYCONDITION).expect("where").children[0];
        let second = &cond.children[1].children[1];
        assert!(second.flag(ATTR_ISPARAM));
        assert_eq!(second.attr(ATTR_INDEX), Some("1"));
    }

    #[test]
    fn negative_literals_fold_into_the_token() {
        let tree = parse("SELECT a FROM t WHERE a > -3");
        let cond = &tree.child(QUERYCONDITION).expect("where").children[0];
        assert_eq!(cond.children[1].attr(ATTR_VALUE), Some("-3"));
    }

    #[test]
    fn count_star_and_distinct_aggregates() {
        let tree = parse("SELECT COUNT(*), COUNT(DISTINCT b) FROM t GROUP BY a");
        let columns = tree.child(COLUMNS).expect("columns");
        assert!(columns.children[0].flag(ATTR_STAR));
        assert!(columns.children[1].flag(ATTR_DISTINCT));
        assert!(tree.child(GROUPCOLUMNS).is_some());
    }

    #[test]
    fn dml_statements_parse() {
        let insert = parse("INSERT INTO t (a, b) VALUES (1, 'x')");
        assert_eq!(insert.attr(ATTR_TABLE), Some("T"));
        let columns = insert.child(COLUMNS).expect("columns");
        assert_eq!(columns.children[1].attr(ATTR_NAME), Some("B"));

        let update = parse("UPDATE t SET b = b + 1 WHERE a = 3");
        assert!(update.child(QUERYCONDITION).is_some());

        let delete = parse("DELETE FROM t");
        assert_eq!(delete.name, DELETE);
        assert!(delete.child(QUERYCONDITION).is_none());
    }

    #[test]
    fn errors_carry_positions() {
        let err = SqlParser.parse("SELECT FROM t").expect_err("must fail");
        assert_eq!(err.position, 7);
        let err = SqlParser.parse("INSERT INTO t (a) VALUES (1, 2)").expect_err("must fail");
        assert!(err.message.contains("1 columns but 2 values"));
        assert!(SqlParser.parse("SELECT a FROM t extra junk").is_err());
    }
}
