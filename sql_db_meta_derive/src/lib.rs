//! Contains a derive macro for [`TryFromRow`] which converts a postgres Row into a catalog struct
//!
//! Named fields are read by column name, so the select list of a catalog query may be reordered freely.
//! A field can be bound to a differently named column with `#[row(rename = "column")]`.
//! Tuple structs read their columns by position.
//!
//! [`TryFromRow`]: https://docs.rs/sql_db_meta_core/0.1.0/sql_db_meta_core/trait.TryFromRow.html

extern crate proc_macro;

use proc_macro2::TokenStream;

use quote::quote;

use syn::{
	parse_macro_input,
	spanned::Spanned,
	Data,
	DeriveInput,
	Field,
	Fields,
	LitStr,
};

#[proc_macro_derive(TryFromRow, attributes(row))]
/// A derive macro for [`TryFromRow`] which converts from a postgres Row
///
/// ```ignore
/// #[derive(Debug, TryFromRow)]
/// pub struct GetEnums {
/// 	#[row(rename = "typname")]
/// 	pub name: String,
/// 	pub labels: Vec<String>,
/// }
/// ```
///
/// [`TryFromRow`]: https://docs.rs/sql_db_meta_core/0.1.0/sql_db_meta_core/trait.TryFromRow.html
pub fn try_from_postgres_row(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let input = parse_macro_input!(input as DeriveInput);

	match expand(input) {
		Ok(tokens) => tokens.into(),
		Err(e) => e.to_compile_error().into(),
	}
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
	// get the name of the type we want to implement the trait for
	let name = &input.ident;
	let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

	let fields = match &input.data {
		Data::Struct(x) => &x.fields,
		Data::Enum(e) => {
			return Err(syn::Error::new(
				e.enum_token.span(),
				"TryFromRow can only be derived for structs",
			))
		},
		Data::Union(u) => {
			return Err(syn::Error::new(
				u.union_token.span(),
				"TryFromRow can only be derived for structs",
			))
		},
	};

	let from_row_code = match fields {
		Fields::Named(named) => {
			let mut assignments = Vec::with_capacity(named.named.len());
			for field in &named.named {
				let ident = field.ident.as_ref().ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?;
				let column = column_name(field)?.unwrap_or_else(|| ident.to_string());
				assignments.push(quote! { #ident : row.try_get(#column)?, });
			}
			quote! { Ok(Self { #(#assignments)* }) }
		},
		Fields::Unnamed(unnamed) => {
			let gets = (0..unnamed.unnamed.len()).map(|i| quote! { row.try_get(#i)?, });
			quote! { Ok(Self ( #(#gets)* )) }
		},
		Fields::Unit => quote! { Ok(Self) },
	};

	let row_ident = match fields {
		Fields::Unit => quote! { _row },
		_ => quote! { row },
	};

	Ok(quote! {
		impl #impl_generics ::sql_db_meta_core::TryFromRow for #name #ty_generics #where_clause {
			fn from_row(#row_ident: &::sql_db_meta_core::Row) -> ::core::result::Result<Self, ::sql_db_meta_core::SqlError> {
				#from_row_code
			}
		}
	})
}

/// Reads `#[row(rename = "...")]` off a field
fn column_name(field: &Field) -> syn::Result<Option<String>> {
	let mut rename = None;
	for attr in field.attrs.iter().filter(|a| a.path().is_ident("row")) {
		attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("rename") {
				let lit: LitStr = meta.value()?.parse()?;
				rename = Some(lit.value());
				Ok(())
			} else {
				Err(meta.error("unsupported row attribute, expected `rename`"))
			}
		})?;
	}
	Ok(rename)
}
