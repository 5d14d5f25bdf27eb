use chumsky::prelude::*;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<SelectStatement>),
    CreateTable(CreateTableStatement),
    Insert(InsertStatement),
    Delete(DeleteStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub select_list: Vec<SelectItem>,
    pub from_table: String,
    pub join: Option<JoinClause>,
    pub where_clauses: Vec<Condition>,
    pub order_by: Vec<(ColumnRef, bool)>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column(ColumnRef),
    Aggregate {
        function: AggregateFunction,
        column: ColumnRef,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Abs,
}

/// A possibly table-qualified column name.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: ColumnRef,
    pub op: CompareOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table_name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table_name: String,
    pub where_clauses: Vec<Condition>,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Abs => write!(f, "ABS"),
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Wildcard => write!(f, "*"),
            SelectItem::Column(column) => write!(f, "{}", column),
            SelectItem::Aggregate { function, column } => write!(f, "{}({})", function, column),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(select) => {
                write!(f, "SELECT ")?;
                for (index, item) in select.select_list.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, " FROM {}", select.from_table)?;
                if let Some(join) = &select.join {
                    write!(f, " JOIN {} ON {} = {}", join.table, join.left, join.right)?;
                }
                if !select.where_clauses.is_empty() {
                    write!(f, " WHERE ")?;
                    for (index, condition) in select.where_clauses.iter().enumerate() {
                        if index > 0 {
                            write!(f, " AND ")?;
                        }
                        write!(
                            f,
                            "{} {} {}",
                            condition.column, condition.op, condition.value
                        )?;
                    }
                }
                if !select.order_by.is_empty() {
                    write!(f, " ORDER BY ")?;
                    for (index, (column, ascending)) in select.order_by.iter().enumerate() {
                        if index > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} {}", column, if *ascending { "ASC" } else { "DESC" })?;
                    }
                }
                if let Some(limit) = select.limit {
                    write!(f, " LIMIT {}", limit)?;
                }
                Ok(())
            }
            Statement::CreateTable(create) => {
                write!(f, "CREATE TABLE {} (", create.table_name)?;
                for (index, column) in create.columns.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", column.name, column.data_type)?;
                }
                write!(f, ")")
            }
            Statement::Insert(insert) => {
                write!(f, "INSERT INTO {} VALUES (", insert.table_name)?;
                for (index, value) in insert.values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
            Statement::Delete(delete) => {
                write!(f, "DELETE FROM {}", delete.table_name)?;
                if !delete.where_clauses.is_empty() {
                    write!(f, " WHERE ")?;
                    for (index, condition) in delete.where_clauses.iter().enumerate() {
                        if index > 0 {
                            write!(f, " AND ")?;
                        }
                        write!(
                            f,
                            "{} {} {}",
                            condition.column, condition.op, condition.value
                        )?;
                    }
                }
                Ok(())
            }
        }
    }
}

pub fn parse_sql(input: &str) -> Result<Vec<Statement>, Vec<Simple<char>>> {
    sql_parser().parse(input)
}

fn sql_parser() -> impl Parser<char, Vec<Statement>, Error = Simple<char>> {
    let ident =
        text::ident()
            .padded()
            .try_map(|ident: String, span| match ident.to_uppercase().as_str() {
                "SELECT" | "FROM" | "WHERE" | "ORDER" | "BY" | "LIMIT" | "CREATE" | "TABLE"
                | "INSERT" | "INTO" | "VALUES" | "DELETE" | "JOIN" | "ON" | "AND" | "ASC"
                | "DESC" | "INT" | "TEXT" | "SUM" | "ABS" => Err(Simple::custom(
                    span,
                    format!("keyword `{}` cannot be used as an identifier", ident),
                )),
                _ => Ok(ident),
            });

    let keyword = |word: &'static str| {
        text::ident().padded().try_map(move |ident: String, span| {
            if ident.eq_ignore_ascii_case(word) {
                Ok(())
            } else {
                Err(Simple::custom(span, format!("expected keyword {}", word)))
            }
        })
    };

    let column_ref = ident
        .clone()
        .then(just('.').ignore_then(ident.clone()).or_not())
        .map(|(first, second)| match second {
            Some(column) => ColumnRef {
                table: Some(first),
                column,
            },
            None => ColumnRef {
                table: None,
                column: first,
            },
        });

    let number = just('-')
        .or_not()
        .then(text::int(10))
        .map(|(sign, digits): (Option<char>, String)| match sign {
            Some(_) => format!("-{digits}"),
            None => digits,
        })
        .padded();

    let quoted_string = just('\'')
        .ignore_then(filter(|c: &char| *c != '\'').repeated())
        .then_ignore(just('\''))
        .collect::<String>()
        .padded();

    let value = number.or(quoted_string).or(ident.clone());

    let compare_op = choice((
        just("!=").to(CompareOp::NotEq),
        just("<>").to(CompareOp::NotEq),
        just("<=").to(CompareOp::LtEq),
        just(">=").to(CompareOp::GtEq),
        just("<").to(CompareOp::Lt),
        just(">").to(CompareOp::Gt),
        just("=").to(CompareOp::Eq),
    ))
    .padded();

    let condition = column_ref
        .clone()
        .then(compare_op)
        .then(value.clone())
        .map(|((column, op), value)| Condition { column, op, value });

    let where_clause = keyword("WHERE").ignore_then(
        condition
            .separated_by(keyword("AND"))
            .at_least(1)
            .collect::<Vec<_>>(),
    );

    let aggregate = choice((
        keyword("SUM").to(AggregateFunction::Sum),
        keyword("ABS").to(AggregateFunction::Abs),
    ))
    .then(
        column_ref
            .clone()
            .delimited_by(just('(').padded(), just(')').padded()),
    )
    .map(|(function, column)| SelectItem::Aggregate { function, column });

    let select_item = just('*')
        .padded()
        .to(SelectItem::Wildcard)
        .or(aggregate)
        .or(column_ref.clone().map(SelectItem::Column));

    let order_by = keyword("ORDER").ignore_then(keyword("BY")).ignore_then(
        column_ref
            .clone()
            .then(
                choice((keyword("ASC").to(true), keyword("DESC").to(false)))
                    .or_not()
                    .map(|direction| direction.unwrap_or(true)),
            )
            .separated_by(just(',').padded())
            .at_least(1)
            .collect::<Vec<_>>(),
    );

    let limit = keyword("LIMIT").ignore_then(text::int(10).padded().try_map(
        |value: String, span| {
            value
                .parse::<usize>()
                .map_err(|_| Simple::custom(span, format!("invalid LIMIT value: {value}")))
        },
    ));

    let join = keyword("JOIN")
        .ignore_then(ident.clone())
        .then_ignore(keyword("ON"))
        .then(column_ref.clone())
        .then_ignore(just('=').padded())
        .then(column_ref.clone())
        .map(|((table, left), right)| JoinClause { table, left, right });

    let select = keyword("SELECT")
        .ignore_then(
            select_item
                .separated_by(just(',').padded())
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then_ignore(keyword("FROM"))
        .then(ident.clone())
        .then(join.or_not())
        .then(where_clause.clone().or_not())
        .then(order_by.or_not())
        .then(limit.or_not())
        .map(
            |(((((select_list, from_table), join), where_clauses), order_by), limit)| {
                Statement::Select(Box::new(SelectStatement {
                    select_list,
                    from_table,
                    join,
                    where_clauses: where_clauses.unwrap_or_default(),
                    order_by: order_by.unwrap_or_default(),
                    limit,
                }))
            },
        );

    let data_type = text::ident()
        .padded()
        .try_map(|name: String, span| match name.to_uppercase().as_str() {
            "INT" => Ok(DataType::Int),
            "TEXT" => Ok(DataType::Text),
            other => Err(Simple::custom(span, format!("unknown type: {}", other))),
        });

    let column_def = ident
        .clone()
        .then(data_type)
        .map(|(name, data_type)| ColumnDef { name, data_type });

    let create_table = keyword("CREATE")
        .ignore_then(keyword("TABLE"))
        .ignore_then(ident.clone())
        .then(
            column_def
                .separated_by(just(',').padded())
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just('(').padded(), just(')').padded()),
        )
        .map(|(table_name, columns)| {
            Statement::CreateTable(CreateTableStatement {
                table_name,
                columns,
            })
        });

    let insert = keyword("INSERT")
        .ignore_then(keyword("INTO"))
        .ignore_then(ident.clone())
        .then_ignore(keyword("VALUES"))
        .then(
            value
                .separated_by(just(',').padded())
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just('(').padded(), just(')').padded()),
        )
        .map(|(table_name, values)| Statement::Insert(InsertStatement { table_name, values }));

    let delete = keyword("DELETE")
        .ignore_then(keyword("FROM"))
        .ignore_then(ident.clone())
        .then(where_clause.or_not())
        .map(|(table_name, where_clauses)| {
            Statement::Delete(DeleteStatement {
                table_name,
                where_clauses: where_clauses.unwrap_or_default(),
            })
        });

    let statement = create_table.or(insert).or(delete).or(select);

    statement
        .separated_by(just(';').padded())
        .allow_trailing()
        .at_least(1)
        .collect::<Vec<_>>()
        .padded()
        .then_ignore(end())
}
