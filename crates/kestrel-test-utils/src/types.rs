use kestrel_hir::Type;

/// Fully-qualified name for a short type name used in fixtures.
pub fn qualify(name: &str) -> String {
    match name {
        "Any" | "Unit" | "Nothing" | "Int" | "Long" | "Short" | "Byte" | "Double" | "Float"
        | "Boolean" | "Char" | "String" | "Number" | "CharSequence" | "Array" | "Comparable" => {
            format!("kotlin.{name}")
        }
        "List" | "MutableList" | "Set" | "Map" | "Collection" | "Iterable" => {
            format!("kotlin.collections.{name}")
        }
        "KClass" => "kotlin.reflect.KClass".to_string(),
        "Class" => "java.lang.Class".to_string(),
        _ => name.to_string(),
    }
}

/// Parses a type as written in a fixture (`List<String>?`, `java.lang.Class<*>`).
pub fn parse_type(text: &str) -> Type {
    let mut parser = TypeParser {
        chars: text.trim().chars().collect(),
        pos: 0,
    };
    parser.parse()
}

struct TypeParser {
    chars: Vec<char>,
    pos: usize,
}

impl TypeParser {
    fn parse(&mut self) -> Type {
        self.skip_ws();
        let mut name = String::new();
        while let Some(c) = self.chars.get(self.pos).copied() {
            if matches!(c, '<' | '>' | ',' | '?') || c.is_whitespace() {
                break;
            }
            name.push(c);
            self.pos += 1;
        }

        let mut args = Vec::new();
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&'<') {
            self.pos += 1;
            loop {
                args.push(self.parse());
                self.skip_ws();
                match self.chars.get(self.pos) {
                    Some(',') => self.pos += 1,
                    Some('>') => {
                        self.pos += 1;
                        break;
                    }
                    _ => break,
                }
            }
        }

        self.skip_ws();
        let nullable = self.chars.get(self.pos) == Some(&'?');
        if nullable {
            self.pos += 1;
        }

        let mut ty = Type::with_args(qualify(&name), args);
        ty.nullable = nullable;
        ty
    }

    fn skip_ws(&mut self) {
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_whitespace())
        {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generic_nullable_types() {
        let ty = parse_type("Map<String, List<Int?>>?");
        assert_eq!(
            ty.render_qualified(),
            "kotlin.collections.Map<kotlin.String, kotlin.collections.List<kotlin.Int?>>?"
        );
        assert_eq!(parse_type("Class<*>").render(), "Class<*>");
    }
}
