use super::CodeGenerator;
use crate::ast::*;

// Binding strength, loosest first.
pub(super) const SEQUENCE: u8 = 0;
pub(super) const ASSIGNMENT: u8 = 1;
const CONDITIONAL: u8 = 2;
const UNARY: u8 = 14;
const POSTFIX: u8 = 15;
pub(super) const CALL: u8 = 17;
const PRIMARY: u8 = 18;

fn binary_precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::BitOr => 5,
        BinaryOperator::BitXor => 6,
        BinaryOperator::BitAnd => 7,
        BinaryOperator::Equal
        | BinaryOperator::NotEqual
        | BinaryOperator::StrictEqual
        | BinaryOperator::StrictNotEqual => 8,
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual
        | BinaryOperator::In
        | BinaryOperator::Instanceof => 9,
        BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight | BinaryOperator::UnsignedShiftRight => 10,
        BinaryOperator::Add | BinaryOperator::Subtract => 11,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Remainder => 12,
        BinaryOperator::Exponent => 13,
    }
}

fn logical_precedence(op: LogicalOperator) -> u8 {
    match op {
        LogicalOperator::Nullish | LogicalOperator::Or => 3,
        LogicalOperator::And => 4,
    }
}

fn precedence(expr: &Expression) -> u8 {
    match expr {
        Expression::Sequence(_) => SEQUENCE,
        Expression::Assignment(..) => ASSIGNMENT,
        Expression::Function(function) if function.kind == FunctionKind::Arrow => ASSIGNMENT,
        Expression::Conditional { .. } => CONDITIONAL,
        Expression::Logical(op, _, _) => logical_precedence(*op),
        Expression::Binary(op, _, _) => binary_precedence(*op),
        Expression::Unary(..) => UNARY,
        Expression::Update { prefix: true, .. } => UNARY,
        Expression::Update { prefix: false, .. } => POSTFIX,
        Expression::Literal(Literal::Number(n)) if n.is_sign_negative() && *n != 0.0 => UNARY,
        Expression::Call(..) | Expression::New(..) | Expression::Member(..) => CALL,
        _ => PRIMARY,
    }
}

/// Whether a `new` callee would swallow a call if printed bare.
fn contains_call(expr: &Expression) -> bool {
    match expr {
        Expression::Call(..) => true,
        Expression::Member(object, _) => contains_call(object),
        _ => false,
    }
}

impl CodeGenerator {
    pub fn expression_to_string(&mut self, expr: &Expression) -> String {
        self.expression_to_string_at(expr, SEQUENCE)
    }

    pub(super) fn expression_to_string_at(&mut self, expr: &Expression, min: u8) -> String {
        let original_output = std::mem::take(&mut self.output);
        self.generate_expression_at(expr, min);
        std::mem::replace(&mut self.output, original_output)
    }

    pub fn generate_expression(&mut self, expr: &Expression) {
        self.generate_expression_at(expr, SEQUENCE);
    }

    /// Writes `expr`, parenthesized when it binds looser than `min`.
    pub(super) fn generate_expression_at(&mut self, expr: &Expression, min: u8) {
        if precedence(expr) < min {
            self.write("(");
            self.generate_expression_inner(expr);
            self.write(")");
        } else {
            self.generate_expression_inner(expr);
        }
    }

    fn generate_expression_inner(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier(id) => self.write(&id.name),
            Expression::Literal(literal) => self.generate_literal(literal),
            Expression::This => self.write("this"),
            Expression::Array(elements) => {
                self.write("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    if let Some(element) = element {
                        self.generate_expression_at(element, ASSIGNMENT);
                    }
                }
                // A trailing hole needs its own comma to survive.
                if matches!(elements.last(), Some(None)) {
                    self.write(",");
                }
                self.write("]");
            }
            Expression::Object(properties) => self.generate_object(properties),
            Expression::Function(function) => self.generate_function(function),
            Expression::Unary(op, argument) => {
                self.write(op.as_str());
                let text = self.expression_to_string_at(argument, UNARY);
                let needs_space = op.is_keyword()
                    || (*op == UnaryOperator::Minus && text.starts_with('-'))
                    || (*op == UnaryOperator::Plus && text.starts_with('+'));
                if needs_space {
                    self.write(" ");
                }
                self.write(&text);
            }
            Expression::Update {
                operator,
                prefix,
                argument,
            } => {
                if *prefix {
                    self.write(operator.as_str());
                    self.generate_expression_at(argument, UNARY);
                } else {
                    self.generate_expression_at(argument, CALL);
                    self.write(operator.as_str());
                }
            }
            Expression::Binary(op, left, right) => {
                let prec = binary_precedence(*op);
                let (left_min, right_min) = if *op == BinaryOperator::Exponent {
                    (POSTFIX, prec)
                } else {
                    (prec, prec + 1)
                };
                self.generate_expression_at(left, left_min);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.generate_expression_at(right, right_min);
            }
            Expression::Logical(op, left, right) => {
                let prec = logical_precedence(*op);
                self.generate_expression_at(left, prec);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.generate_expression_at(right, prec + 1);
            }
            Expression::Assignment(op, target, value) => {
                self.generate_expression_at(target, CALL);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.generate_expression_at(value, ASSIGNMENT);
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.generate_expression_at(test, CONDITIONAL + 1);
                self.write(" ? ");
                self.generate_expression_at(consequent, ASSIGNMENT);
                self.write(" : ");
                self.generate_expression_at(alternate, ASSIGNMENT);
            }
            Expression::Call(callee, arguments) => {
                self.generate_expression_at(callee, CALL);
                self.generate_arguments(arguments);
            }
            Expression::New(callee, arguments) => {
                self.write("new ");
                if contains_call(callee) {
                    self.generate_expression_at(callee, PRIMARY);
                } else {
                    self.generate_expression_at(callee, CALL);
                }
                self.generate_arguments(arguments);
            }
            Expression::Member(object, property) => {
                // `1.toString` would lex as a malformed number.
                if matches!(object.as_ref(), Expression::Literal(Literal::Number(_))) {
                    self.write("(");
                    self.generate_expression_inner(object);
                    self.write(")");
                } else {
                    self.generate_expression_at(object, CALL);
                }
                match property {
                    MemberProperty::Static(name) => {
                        self.write(".");
                        self.write(&name.name);
                    }
                    MemberProperty::Computed(index) => {
                        self.write("[");
                        self.generate_expression(index);
                        self.write("]");
                    }
                }
            }
            Expression::Sequence(expressions) => {
                for (i, expr) in expressions.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.generate_expression_at(expr, ASSIGNMENT);
                }
            }
        }
    }

    fn generate_arguments(&mut self, arguments: &[Expression]) {
        self.write("(");
        for (i, argument) in arguments.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.generate_expression_at(argument, ASSIGNMENT);
        }
        self.write(")");
    }

    fn generate_literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Number(n) => self.write(&format_number(*n)),
            Literal::String(s) => self.write(&quote_string(s)),
            Literal::Boolean(b) => self.write(if *b { "true" } else { "false" }),
            Literal::Null => self.write("null"),
        }
    }

    fn generate_object(&mut self, properties: &[Property]) {
        if properties.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{ ");
        for (i, property) in properties.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            if property.shorthand {
                if let (PropertyKey::Identifier(key), Expression::Identifier(value)) =
                    (&property.key, &property.value)
                {
                    if key.name == value.name {
                        self.write(&key.name);
                        continue;
                    }
                }
            }
            match &property.key {
                PropertyKey::Identifier(id) => self.write(&id.name),
                PropertyKey::String(s) => self.write(&quote_string(s)),
                PropertyKey::Number(n) => self.write(&format_number(*n)),
                PropertyKey::Computed(key) => {
                    self.write("[");
                    self.generate_expression_at(key, ASSIGNMENT);
                    self.write("]");
                }
            }
            self.write(": ");
            self.generate_expression_at(&property.value, ASSIGNMENT);
        }
        self.write(" }");
    }
}

fn quote_string(s: &str) -> String {
    let quoted = serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""));
    // JSON leaves these raw, but they end a line in script source.
    quoted.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}

/// Number-to-text conversion with script semantics: integral values print
/// without a fraction and very large or small magnitudes use exponent form.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n < 0.0 {
        return format!("-{}", format_number(-n));
    }

    // Shortest round-trip digits and decimal exponent, e.g. "1.5e-7".
    let scientific = format!("{n:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exponent + 1;

    if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{int_part}.{frac_part}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let sign = if point - 1 < 0 { "-" } else { "+" };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{sign}{}", (point - 1).abs())
        } else {
            format!("{first}.{rest}e{sign}{}", (point - 1).abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::format_number;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(123456789.0), "123456789");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(-0.0), "0");
    }
}
