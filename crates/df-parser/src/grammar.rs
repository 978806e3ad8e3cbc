//! Chumsky grammar for the Graphviz DOT language.
//!
//! Covers the full statement grammar: `strict`, `graph`/`digraph`, node,
//! edge (chains, ports, subgraph endpoints), attribute, assignment and
//! nested subgraph statements. IDs may be identifiers, numerals, quoted
//! strings (with `+` concatenation) or HTML strings. Comments use `//`,
//! `/* */` or `#`.

use std::fmt;
use std::ops::Range;

use chumsky::prelude::*;

use crate::ast::{
    AttrStmt, AttrTarget, Attribute, DotGraph, EdgeEndpoint, EdgeOp, EdgeStmt, Id, IdKind,
    NodeId, NodeStmt, Statement, Subgraph, is_identifier_continue, is_identifier_start,
    is_keyword,
};

type Extra<'a> = extra::Err<Rich<'a, char>>;

/// A syntax error with its location in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotSyntaxError {
    /// Byte offset into the input.
    pub offset: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    pub message: String,
}

impl DotSyntaxError {
    fn from_rich(input: &str, error: &Rich<'_, char>) -> Self {
        let offset = error.span().start.min(input.len());
        let (line, column) = line_and_column(input, offset);
        Self {
            offset,
            line,
            column,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for DotSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

/// Parse a complete DOT document.
pub fn parse_dot_document(input: &str) -> Result<DotGraph, Vec<DotSyntaxError>> {
    parse_dot_document_with_body(input).map(|(graph, _)| graph)
}

/// Parse a complete DOT document and report where its statement list sits:
/// the range starts right after the root `{` and ends at the matching `}`.
pub fn parse_dot_document_with_body(
    input: &str,
) -> Result<(DotGraph, Range<usize>), Vec<DotSyntaxError>> {
    document_parser()
        .parse(input)
        .into_result()
        .map_err(|errors| {
            errors
                .iter()
                .map(|error| DotSyntaxError::from_rich(input, error))
                .collect()
        })
}

fn line_and_column(input: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (index, ch) in input.char_indices() {
        if index >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn document_parser<'a>() -> impl Parser<'a, &'a str, (DotGraph, Range<usize>), Extra<'a>> {
    let open = lexeme(just('{').map_with(|_, extra| {
        let span: SimpleSpan = extra.span();
        span.end
    }));
    let close = lexeme(just('}').map_with(|_, extra| {
        let span: SimpleSpan = extra.span();
        span.start
    }));

    padding()
        .ignore_then(keyword_token("strict").or_not())
        .then(choice((
            keyword_token("digraph").to(true),
            keyword_token("graph").to(false),
        )))
        .then(lexeme(id()).or_not())
        .then(open)
        .then(statement_list())
        .then(close)
        .then_ignore(symbol(';').or_not())
        .then_ignore(end())
        .map(|(((((strict, directed), id), open), statements), close)| {
            let graph = DotGraph {
                strict: strict.is_some(),
                directed,
                id,
                statements,
            };
            (graph, open..close)
        })
}

fn statement_list<'a>() -> impl Parser<'a, &'a str, Vec<Statement>, Extra<'a>> + Clone {
    recursive(|statements| {
        let attr_list = attribute_list();

        let node_id = lexeme(id())
            .then(
                symbol(':')
                    .ignore_then(lexeme(id()))
                    .repeated()
                    .at_most(2)
                    .collect::<Vec<Id>>(),
            )
            .map(|(id, port)| NodeId { id, port });

        let subgraph = keyword_token("subgraph")
            .ignore_then(lexeme(id()).or_not())
            .or_not()
            .then(statements.delimited_by(symbol('{'), symbol('}')))
            .map(|(header, statements): (Option<Option<Id>>, Vec<Statement>)| Subgraph {
                keyword: header.is_some(),
                id: header.flatten(),
                statements,
            })
            .boxed();

        let endpoint = choice((
            subgraph.clone().map(EdgeEndpoint::Subgraph),
            node_id.clone().map(EdgeEndpoint::Node),
        ));

        let edge_op = choice((
            lexeme(just("->")).to(EdgeOp::Directed),
            lexeme(just("--")).to(EdgeOp::Undirected),
        ));

        let edge_rhs = edge_op
            .then(endpoint)
            .repeated()
            .at_least(1)
            .collect::<Vec<(EdgeOp, EdgeEndpoint)>>();

        let attr_stmt = choice((
            keyword_token("graph").to(AttrTarget::Graph),
            keyword_token("node").to(AttrTarget::Node),
            keyword_token("edge").to(AttrTarget::Edge),
        ))
        .then(attr_list.clone())
        .map(|(target, attributes)| Statement::Attr(AttrStmt { target, attributes }));

        let subgraph_stmt = subgraph
            .then(edge_rhs.clone().then(attr_list.clone().or_not()).or_not())
            .map(|(subgraph, rest)| match rest {
                Some((tail, attributes)) => Statement::Edge(EdgeStmt {
                    head: EdgeEndpoint::Subgraph(subgraph),
                    tail,
                    attributes: attributes.unwrap_or_default(),
                }),
                None => Statement::Subgraph(subgraph),
            });

        let assignment = lexeme(id())
            .then_ignore(symbol('='))
            .then(lexeme(id()))
            .map(|(key, value)| Statement::Assign(Attribute { key, value }));

        let node_or_edge = node_id
            .then(edge_rhs.or_not())
            .then(attr_list.or_not())
            .map(|((node, tail), attributes)| {
                let attributes = attributes.unwrap_or_default();
                match tail {
                    Some(tail) => Statement::Edge(EdgeStmt {
                        head: EdgeEndpoint::Node(node),
                        tail,
                        attributes,
                    }),
                    None => Statement::Node(NodeStmt { node, attributes }),
                }
            });

        choice((attr_stmt, subgraph_stmt, assignment, node_or_edge))
            .then_ignore(symbol(';').repeated())
            .repeated()
            .collect::<Vec<Statement>>()
    })
}

fn attribute_list<'a>() -> impl Parser<'a, &'a str, Vec<Attribute>, Extra<'a>> + Clone {
    let attribute = lexeme(id())
        .then_ignore(symbol('='))
        .then(lexeme(id()))
        .then_ignore(choice((symbol(';'), symbol(','))).or_not())
        .map(|(key, value)| Attribute { key, value });

    attribute
        .repeated()
        .collect::<Vec<Attribute>>()
        .delimited_by(symbol('['), symbol(']'))
        .repeated()
        .at_least(1)
        .collect::<Vec<Vec<Attribute>>>()
        .map(|lists| lists.into_iter().flatten().collect())
}

fn id<'a>() -> impl Parser<'a, &'a str, Id, Extra<'a>> + Clone {
    choice((
        identifier().try_map(|ident: &str, span| {
            if is_keyword(ident) {
                Err(Rich::custom(
                    span,
                    format!("keyword `{ident}` cannot be used as an unquoted id"),
                ))
            } else {
                Ok(Id::new(IdKind::Identifier, ident))
            }
        }),
        numeral().map(|numeral: &str| Id::new(IdKind::Numeral, numeral)),
        quoted_string().map(|text| Id::new(IdKind::Quoted, text)),
        html_string().map(|html: &str| Id::new(IdKind::Html, &html[1..html.len() - 1])),
    ))
}

fn identifier<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    any()
        .filter(|ch: &char| is_identifier_start(*ch))
        .then(
            any()
                .filter(|ch: &char| is_identifier_continue(*ch))
                .repeated(),
        )
        .to_slice()
}

fn numeral<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    let digit = any().filter(|ch: &char| ch.is_ascii_digit());
    let fraction = just('.').then(digit.clone().repeated().at_least(1));
    let integer = digit
        .clone()
        .repeated()
        .at_least(1)
        .then(just('.').then(digit.repeated()).or_not());

    just('-')
        .or_not()
        .then(choice((fraction.ignored(), integer.ignored())))
        .to_slice()
}

fn quoted_string<'a>() -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    let body = choice((
        just('\\').then(any()).ignored(),
        any().filter(|ch: &char| *ch != '"' && *ch != '\\').ignored(),
    ))
    .repeated()
    .to_slice();

    body.delimited_by(just('"'), just('"'))
        .separated_by(just('+').padded_by(padding()))
        .at_least(1)
        .collect::<Vec<&str>>()
        .map(|segments| segments.concat())
}

fn html_string<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    recursive(|html| {
        just('<')
            .then(
                choice((
                    html.ignored(),
                    any().filter(|ch: &char| *ch != '<' && *ch != '>').ignored(),
                ))
                .repeated(),
            )
            .then(just('>'))
            .to_slice()
    })
}

fn keyword<'a>(word: &'static str) -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    identifier()
        .filter(move |ident: &&str| ident.eq_ignore_ascii_case(word))
        .ignored()
}

fn keyword_token<'a>(word: &'static str) -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    lexeme(keyword(word))
}

fn symbol<'a>(ch: char) -> impl Parser<'a, &'a str, char, Extra<'a>> + Clone {
    lexeme(just(ch))
}

fn lexeme<'a, O, P>(parser: P) -> impl Parser<'a, &'a str, O, Extra<'a>> + Clone
where
    P: Parser<'a, &'a str, O, Extra<'a>> + Clone,
{
    parser.then_ignore(padding())
}

/// Whitespace and comments between tokens.
fn padding<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    let whitespace = any().filter(|ch: &char| ch.is_whitespace()).ignored();
    let line_comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();
    let block_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();
    let hash_line = just('#')
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    choice((whitespace, line_comment, block_comment, hash_line))
        .repeated()
        .ignored()
}

#[cfg(test)]
mod tests {
    use super::{parse_dot_document, parse_dot_document_with_body};
    use crate::ast::{AttrTarget, EdgeEndpoint, EdgeOp, IdKind, Statement};

    #[test]
    fn parses_minimal_digraph() {
        let graph = parse_dot_document("digraph G { a -> b; b -> c; }").expect("valid dot");
        assert!(graph.directed);
        assert!(!graph.strict);
        assert_eq!(graph.id.as_ref().map(|id| id.text()), Some("G"));
        assert_eq!(graph.statements.len(), 2);
        assert_eq!(graph.edge_operators(), vec![EdgeOp::Directed, EdgeOp::Directed]);
    }

    #[test]
    fn parses_attributes_at_every_scope() {
        let input = r#"strict digraph "flow" {
            rankdir = LR
            graph [splines=ortho];
            node [shape=box, style="rounded,filled"];
            edge [arrowsize=0.3]
            start [label="Start"];
            start -> check [label="begin"];
        }"#;
        let graph = parse_dot_document(input).expect("valid dot");
        assert!(graph.strict);
        assert_eq!(graph.id.as_ref().map(|id| id.kind), Some(IdKind::Quoted));
        assert!(matches!(graph.statements[0], Statement::Assign(_)));
        let targets: Vec<AttrTarget> = graph
            .statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Attr(attr) => Some(attr.target),
                _ => None,
            })
            .collect();
        assert_eq!(
            targets,
            vec![AttrTarget::Graph, AttrTarget::Node, AttrTarget::Edge]
        );
        assert_eq!(
            graph.graph_attribute("rankdir").map(|id| id.text()),
            Some("LR")
        );
    }

    #[test]
    fn parses_chains_ports_and_subgraph_endpoints() {
        let input = "digraph { a:n -> b -> {c d} [color=red]; subgraph cluster_x { e; f -> g } }";
        let graph = parse_dot_document(input).expect("valid dot");
        match &graph.statements[0] {
            Statement::Edge(edge) => {
                match &edge.head {
                    EdgeEndpoint::Node(node) => assert_eq!(node.port.len(), 1),
                    other => panic!("unexpected head {other:?}"),
                }
                assert_eq!(edge.tail.len(), 2);
                assert!(matches!(edge.tail[1].1, EdgeEndpoint::Subgraph(_)));
                assert_eq!(edge.attributes.len(), 1);
            }
            other => panic!("expected edge, got {other:?}"),
        }
        match &graph.statements[1] {
            Statement::Subgraph(subgraph) => {
                assert!(subgraph.keyword);
                assert_eq!(subgraph.id.as_ref().map(|id| id.text()), Some("cluster_x"));
                assert_eq!(subgraph.statements.len(), 2);
            }
            other => panic!("expected subgraph, got {other:?}"),
        }
    }

    #[test]
    fn parses_comments_numerals_html_and_concatenation() {
        let input = "// leading\n# preprocessor line\ndigraph G {\n  /* block */ a [width=.5, height=-1.25];\n  b [label=<<b>bold</b>>];\n  c [label=\"one\" + \"two\"];\n}";
        let graph = parse_dot_document(input).expect("valid dot");
        assert_eq!(graph.statements.len(), 3);
        match &graph.statements[1] {
            Statement::Node(node) => {
                assert_eq!(node.attributes[0].value.kind, IdKind::Html);
                assert_eq!(node.attributes[0].value.text(), "<b>bold</b>");
            }
            other => panic!("expected node, got {other:?}"),
        }
        match &graph.statements[2] {
            Statement::Node(node) => assert_eq!(node.attributes[0].value.text(), "onetwo"),
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(parse_dot_document("DiGraph G { Node [shape=box]; a -> b }").is_ok());
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let graph =
            parse_dot_document(r#"digraph { a [label="say \"hi\""]; }"#).expect("valid dot");
        match &graph.statements[0] {
            Statement::Node(node) => {
                assert_eq!(node.attributes[0].value.text(), r#"say \"hi\""#);
            }
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_documents() {
        for input in [
            "",
            "digraph G {",
            "digraph G { a -> ; }",
            "digraph G { a [label=]; }",
            "digraph G { node -> b; }",
            "digraph G { a -> b; } trailing",
            "flowchart LR\nA-->B",
            "digraph G { a [label=\"unterminated]; }",
        ] {
            assert!(
                parse_dot_document(input).is_err(),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn syntax_errors_carry_positions() {
        let errors = parse_dot_document("digraph G {\n  a -> ;\n}").expect_err("invalid");
        let first = &errors[0];
        assert_eq!(first.line, 2);
        assert!(first.column > 1);
        assert!(first.to_string().starts_with("line 2"));
    }

    #[test]
    fn printed_graph_parses_back_to_the_same_tree() {
        let input = "digraph G { rankdir=LR; node [shape=box]; a [label=\"A b\"]; a -> b -> c [label=x]; subgraph s { d } }";
        let graph = parse_dot_document(input).expect("valid dot");
        let reparsed = parse_dot_document(&graph.to_string()).expect("printed dot parses");
        assert_eq!(graph, reparsed);
    }

    #[test]
    fn body_range_skips_braces_in_names_and_comments() {
        let input = "/* {draft} */ digraph \"Order {v2}\" { a -> b; } ";
        let (_, body) = parse_dot_document_with_body(input).expect("valid dot");
        assert_eq!(&input[body.clone()], " a -> b; ");
        assert_eq!(&input[body.start - 1..body.start], "{");
        assert_eq!(&input[body.end..=body.end], "}");
    }
}
