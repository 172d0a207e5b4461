use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, parse_macro_input};

/// Derive the static metadata table for an operator enum.
///
/// Every variant must be a unit variant carrying an `#[operator(...)]`
/// attribute. The derive generates inherent `const` accessors for the
/// canonical token, precedence, associativity and arity, plus an `ALL`
/// slice and a `from_token` lookup.
///
/// # Attribute syntax
///
/// ```ignore
/// #[operator(token = "+", precedence = 11, assoc = "left")]
/// #[operator(token = "!", precedence = 13, assoc = "right", arity = 1)]
/// ```
///
/// - `token`: canonical textual token (required)
/// - `precedence`: integer binding strength, higher binds tighter (required)
/// - `assoc`: one of `"left"`, `"right"`, `"none"` (required)
/// - `arity`: operand count, defaults to `2`
///
/// The generated code refers to `weaver_lazy::Precedence` and
/// `weaver_lazy::Associativity`, so the deriving crate must be able to
/// name `weaver_lazy` (the crate itself does so via `extern crate self`).
///
/// # Example
/// ```ignore
/// #[derive(Clone, Copy, OperatorTable)]
/// pub enum Operator {
///     #[operator(token = "*", precedence = 12, assoc = "left")]
///     Times,
///     #[operator(token = "+", precedence = 11, assoc = "left")]
///     Plus,
/// }
///
/// assert!(Operator::Times.precedence() > Operator::Plus.precedence());
/// ```
#[proc_macro_derive(OperatorTable, attributes(operator))]
pub fn derive_operator_table(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let enum_name = &input.ident;
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new(
            enum_name.span(),
            "OperatorTable can only be derived for enums",
        ));
    };

    let mut entries = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.ident.span(),
                "operator variants must not carry fields",
            ));
        }

        let attr = variant
            .attrs
            .iter()
            .find(|a| a.path().is_ident("operator"))
            .ok_or_else(|| {
                syn::Error::new(
                    variant.ident.span(),
                    format!("missing #[operator(...)] on `{}`", variant.ident),
                )
            })?;
        let args: OperatorArgs = attr.parse_args()?;
        entries.push((variant.ident.clone(), args));
    }

    let variants: Vec<&Ident> = entries.iter().map(|(ident, _)| ident).collect();

    let token_arms = entries.iter().map(|(ident, args)| {
        let token = &args.token;
        quote! { #enum_name::#ident => #token }
    });

    let precedence_arms = entries.iter().map(|(ident, args)| {
        let level = args.precedence;
        quote! { #enum_name::#ident => weaver_lazy::Precedence::new(#level) }
    });

    let assoc_arms = entries.iter().map(|(ident, args)| {
        let assoc = args.assoc.tokens();
        quote! { #enum_name::#ident => #assoc }
    });

    let arity_arms = entries.iter().map(|(ident, args)| {
        let arity = args.arity;
        quote! { #enum_name::#ident => #arity }
    });

    Ok(quote! {
        impl #enum_name {
            /// Every operator, in declaration order.
            pub const ALL: &'static [#enum_name] = &[#(#enum_name::#variants),*];

            /// Canonical textual token.
            pub const fn token(self) -> &'static str {
                match self {
                    #(#token_arms,)*
                }
            }

            pub const fn precedence(self) -> weaver_lazy::Precedence {
                match self {
                    #(#precedence_arms,)*
                }
            }

            pub const fn associativity(self) -> weaver_lazy::Associativity {
                match self {
                    #(#assoc_arms,)*
                }
            }

            /// Number of operands.
            pub const fn arity(self) -> usize {
                match self {
                    #(#arity_arms,)*
                }
            }

            /// Find the operator spelled `token` that takes `arity` operands.
            pub fn from_token(token: &str, arity: usize) -> Option<#enum_name> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|op| op.token() == token && op.arity() == arity)
            }
        }
    })
}

// -- Attribute arg parsing -----------------------------------------------

enum Assoc {
    Left,
    Right,
    None,
}

impl Assoc {
    fn tokens(&self) -> proc_macro2::TokenStream {
        match self {
            Assoc::Left => quote! { weaver_lazy::Associativity::Left },
            Assoc::Right => quote! { weaver_lazy::Associativity::Right },
            Assoc::None => quote! { weaver_lazy::Associativity::None },
        }
    }
}

struct OperatorArgs {
    token: String,
    precedence: u8,
    assoc: Assoc,
    arity: usize,
}

impl syn::parse::Parse for OperatorArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut token = None;
        let mut precedence = None;
        let mut assoc = None;
        let mut arity = 2usize;

        loop {
            let ident: syn::Ident = input.parse()?;
            input.parse::<syn::Token![=]>()?;

            match ident.to_string().as_str() {
                "token" => {
                    let lit: syn::LitStr = input.parse()?;
                    token = Some(lit.value());
                }
                "precedence" => {
                    let lit: syn::LitInt = input.parse()?;
                    precedence = Some(lit.base10_parse::<u8>()?);
                }
                "arity" => {
                    let lit: syn::LitInt = input.parse()?;
                    arity = lit.base10_parse::<usize>()?;
                }
                "assoc" => {
                    let lit: syn::LitStr = input.parse()?;
                    assoc = Some(match lit.value().as_str() {
                        "left" => Assoc::Left,
                        "right" => Assoc::Right,
                        "none" => Assoc::None,
                        other => {
                            return Err(syn::Error::new(
                                lit.span(),
                                format!(
                                    "unknown associativity `{other}`, expected `left`, `right` or `none`"
                                ),
                            ));
                        }
                    });
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!(
                            "unexpected key `{other}`, expected `token`, `precedence`, `assoc` or `arity`"
                        ),
                    ));
                }
            }

            if input.is_empty() {
                break;
            }
            input.parse::<syn::Token![,]>()?;
        }

        let token = token.ok_or_else(|| input.error("missing `token`"))?;
        let precedence = precedence.ok_or_else(|| input.error("missing `precedence`"))?;
        let assoc = assoc.ok_or_else(|| input.error("missing `assoc`"))?;

        Ok(OperatorArgs {
            token,
            precedence,
            assoc,
            arity,
        })
    }
}
