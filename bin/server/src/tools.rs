//! Built-in tools offered to the model.

use chrono::Local;
use parley_conversation::{ToolDescriptor, ToolError, ToolRegistry};
use parley_core::ConfigurationError;
use rootcause::Report;
use serde_json::{Value as JsonValue, json};

/// Registers the calculator, weather and clock tools.
///
/// # Errors
///
/// Returns `DuplicateTool` if any of them is already registered.
pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), Report<ConfigurationError>> {
    registry.register(calculator_tool())?;
    registry.register(weather_tool())?;
    registry.register(time_tool())?;
    Ok(())
}

fn calculator_tool() -> ToolDescriptor {
    ToolDescriptor::from_fn(
        "calculator",
        "Evaluates an arithmetic expression. Supports + - * / % ** and parentheses, \
         the functions abs, round and sqrt, and the constants pi and e.",
        |args| {
            let expression = args["expression"].as_str().ok_or_else(|| {
                ToolError::invalid_arguments("calculator", "`expression` must be a string")
            })?;
            let value = evaluate(expression).map_err(|e| ToolError::failed("calculator", e))?;
            Ok(format!("{expression} = {}", format_number(value)))
        },
    )
    .with_parameter_schema(json!({
        "type": "object",
        "properties": {
            "expression": {
                "type": "string",
                "description": "The arithmetic expression to evaluate, e.g. (3 + 4) * 2"
            }
        },
        "required": ["expression"]
    }))
}

struct CityWeather {
    city: &'static str,
    temperature: i32,
    condition: &'static str,
    humidity: u32,
}

const WEATHER: &[CityWeather] = &[
    CityWeather {
        city: "Beijing",
        temperature: 15,
        condition: "sunny",
        humidity: 45,
    },
    CityWeather {
        city: "Shanghai",
        temperature: 18,
        condition: "cloudy",
        humidity: 65,
    },
    CityWeather {
        city: "Guangzhou",
        temperature: 25,
        condition: "light rain",
        humidity: 80,
    },
    CityWeather {
        city: "Shenzhen",
        temperature: 24,
        condition: "sunny",
        humidity: 70,
    },
];

fn weather_tool() -> ToolDescriptor {
    ToolDescriptor::from_fn(
        "get_weather",
        "Returns the current weather for a city.",
        |args| {
            let city = args["city"].as_str().ok_or_else(|| {
                ToolError::invalid_arguments("get_weather", "`city` must be a string")
            })?;
            let country = args["country"].as_str().unwrap_or("CN");
            Ok(weather_report(city, country).to_string())
        },
    )
    .with_parameter_schema(json!({
        "type": "object",
        "properties": {
            "city": { "type": "string", "description": "City name, e.g. Beijing" },
            "country": { "type": "string", "description": "Country code, defaults to CN" }
        },
        "required": ["city"]
    }))
}

fn weather_report(city: &str, country: &str) -> JsonValue {
    match WEATHER.iter().find(|w| w.city.eq_ignore_ascii_case(city)) {
        Some(w) => json!({
            "city": w.city,
            "country": country,
            "temperature": format!("{}°C", w.temperature),
            "condition": w.condition,
            "humidity": format!("{}%", w.humidity),
            "timestamp": Local::now().to_rfc3339(),
        }),
        None => json!({
            "error": format!("No weather data for {city}"),
            "available_cities": WEATHER.iter().map(|w| w.city).collect::<Vec<_>>(),
        }),
    }
}

fn time_tool() -> ToolDescriptor {
    ToolDescriptor::from_fn(
        "get_current_time",
        "Returns the current local date and time.",
        |_| {
            Ok(format!(
                "Current time: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ))
        },
    )
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::StarStar);
                } else {
                    tokens.push(Token::Star);
                }
            }
            _ => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    other => return Err(format!("unexpected character '{other}'")),
                });
            }
        }
    }
    Ok(tokens)
}

/// Evaluates an arithmetic expression.
fn evaluate(input: &str) -> Result<f64, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err("unexpected trailing input".to_string());
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

// expression := term (('+' | '-') term)*
// term       := unary (('*' | '/' | '%') unary)*
// unary      := ('-' | '+') unary | power
// power      := primary ('**' unary)?
// primary    := number | ident | ident '(' args ')' | '(' expression ')'
//
// Every recursive path passes through `unary`, so nesting is bounded there.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

const MAX_NESTING: usize = 100;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value += self.term()?;
            } else if self.eat(&Token::Minus) {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value *= self.unary()?;
            } else if self.eat(&Token::Slash) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= divisor;
            } else if self.eat(&Token::Percent) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err("modulo by zero".to_string());
                }
                // Floor modulo: the result takes the sign of the divisor.
                value -= divisor * (value / divisor).floor();
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.depth == MAX_NESTING {
            return Err("expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, String> {
        if self.eat(&Token::Minus) {
            return Ok(-self.unary()?);
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expression()?;
                if !self.eat(&Token::RParen) {
                    return Err("missing ')'".to_string());
                }
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    call_function(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            if !self.eat(&Token::Comma) {
                return Err("expected ',' or ')'".to_string());
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        other => Err(format!("unknown name '{other}'")),
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, String> {
    match (name, args) {
        ("abs", [x]) => Ok(x.abs()),
        ("sqrt", [x]) if *x < 0.0 => Err("sqrt of a negative number".to_string()),
        ("sqrt", [x]) => Ok(x.sqrt()),
        ("round", [x]) => Ok(x.round()),
        ("round", [x, digits]) => {
            let factor = 10f64.powi(*digits as i32);
            Ok((x * factor).round() / factor)
        }
        ("abs" | "sqrt" | "round", _) => {
            Err(format!("wrong number of arguments for {name}()"))
        }
        (other, _) => Err(format!("unknown function '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ToolCallRequest;

    #[test]
    fn evaluates_operator_precedence() {
        assert_eq!(evaluate("2+2").unwrap(), 4.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ** 2").unwrap(), -4.0);
        assert_eq!(evaluate("2 ** -1").unwrap(), 0.5);
        assert_eq!(evaluate("17 % 5").unwrap(), 2.0);
        assert_eq!(evaluate("7 % -3").unwrap(), -2.0);
        assert_eq!(evaluate("-7 % 3").unwrap(), 2.0);
        assert_eq!(evaluate("7 / 2").unwrap(), 3.5);
    }

    #[test]
    fn evaluates_functions_and_constants() {
        assert_eq!(evaluate("abs(-3)").unwrap(), 3.0);
        assert_eq!(evaluate("sqrt(16) + 1").unwrap(), 5.0);
        assert_eq!(evaluate("round(2.6)").unwrap(), 3.0);
        assert_eq!(evaluate("round(3.14159, 2)").unwrap(), 3.14);
        assert!((evaluate("pi").unwrap() - std::f64::consts::PI).abs() < 1e-12);
        assert!((evaluate("e").unwrap() - std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(evaluate("1/0").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("import os").is_err());
        assert!(evaluate("2 $ 3").is_err());
        assert!(evaluate("sqrt(1, 2)").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let parens = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(evaluate(&parens).unwrap(), 1.0);
        assert_eq!(evaluate("--1").unwrap(), 1.0);

        let err = evaluate(&format!("{}1", "-".repeat(200_000))).unwrap_err();
        assert_eq!(err, "expression nested too deeply");
        assert!(evaluate(&format!("{}1", "(".repeat(200_000))).is_err());
        assert!(evaluate(&"2**".repeat(100_000)).is_err());
    }

    #[test]
    fn formats_whole_numbers_without_fraction() {
        assert_eq!(format_number(84.0), "84");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-4.0), "-4");
    }

    #[test]
    fn unknown_city_lists_available_cities() {
        let report = weather_report("Atlantis", "CN");
        assert!(report["error"].as_str().unwrap().contains("Atlantis"));
        assert_eq!(report["available_cities"].as_array().unwrap().len(), 4);

        let known = weather_report("beijing", "CN");
        assert_eq!(known["city"], "Beijing");
        assert_eq!(known["temperature"], "15°C");
    }

    #[tokio::test]
    async fn builtin_tools_run_through_registry() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry).unwrap();
        assert_eq!(registry.len(), 3);

        let calc = ToolCallRequest::new("c1", "calculator", json!({"expression": "12*7"}));
        assert_eq!(registry.execute(&calc).await.unwrap(), "12*7 = 84");

        let bad = ToolCallRequest::new("c2", "calculator", json!({"expression": "1/0"}));
        assert!(matches!(
            registry.execute(&bad).await,
            Err(ToolError::ExecutionFailed { .. })
        ));

        let deep = ToolCallRequest::new(
            "c5",
            "calculator",
            json!({"expression": format!("{}1", "-".repeat(200_000))}),
        );
        assert!(matches!(
            registry.execute(&deep).await,
            Err(ToolError::ExecutionFailed { .. })
        ));

        let missing = ToolCallRequest::new("c3", "calculator", json!({}));
        assert!(matches!(
            registry.execute(&missing).await,
            Err(ToolError::InvalidArguments { .. })
        ));

        let time = ToolCallRequest::new("c4", "get_current_time", json!({}));
        assert!(
            registry
                .execute(&time)
                .await
                .unwrap()
                .starts_with("Current time:")
        );

        assert!(register_builtin_tools(&registry).is_err());
    }
}
